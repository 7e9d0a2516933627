use crate::model::*;

/// Display status at `now`.
///
/// Cancellation overrides time. Otherwise a booking is ongoing from `start`
/// through `end` inclusive, unlike the half-open spans used for conflicts.
pub fn derive_status(span: &Span, stored: StoredStatus, now: Ms) -> BookingStatus {
    if stored == StoredStatus::Cancelled {
        return BookingStatus::Cancelled;
    }
    if now < span.start {
        BookingStatus::Upcoming
    } else if now <= span.end {
        BookingStatus::Ongoing
    } else {
        BookingStatus::Past
    }
}

pub fn view(booking: Booking, now: Ms) -> BookingView {
    let status = derive_status(&booking.span(), booking.status, now);
    BookingView { booking, status }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    #[test]
    fn time_based_labels() {
        let s = Span::new(10 * H, 11 * H);
        assert_eq!(derive_status(&s, StoredStatus::Active, 9 * H), BookingStatus::Upcoming);
        assert_eq!(derive_status(&s, StoredStatus::Active, 10 * H), BookingStatus::Ongoing);
        assert_eq!(derive_status(&s, StoredStatus::Active, 10 * H + 1), BookingStatus::Ongoing);
        assert_eq!(derive_status(&s, StoredStatus::Active, 12 * H), BookingStatus::Past);
    }

    #[test]
    fn end_instant_still_ongoing() {
        let s = Span::new(10 * H, 11 * H);
        assert_eq!(derive_status(&s, StoredStatus::Active, 11 * H), BookingStatus::Ongoing);
        assert_eq!(derive_status(&s, StoredStatus::Active, 11 * H + 1), BookingStatus::Past);
    }

    #[test]
    fn cancelled_overrides_time() {
        let s = Span::new(10 * H, 11 * H);
        for now in [0, 10 * H, 20 * H] {
            assert_eq!(
                derive_status(&s, StoredStatus::Cancelled, now),
                BookingStatus::Cancelled
            );
        }
    }

    #[test]
    fn yesterday_is_past() {
        let now = 100 * H;
        let s = Span::new(now - 24 * H, now - 23 * H);
        assert_eq!(derive_status(&s, StoredStatus::Active, now), BookingStatus::Past);
    }
}
