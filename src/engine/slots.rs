use chrono::NaiveDate;

use crate::config::SchedulerConfig;
use crate::model::*;

use super::conflict::has_conflict;

/// Business hours on `date` as a span in the implicit zone.
pub fn business_window(date: NaiveDate, config: &SchedulerConfig) -> Span {
    Span::new(at(date, config.opening), at(date, config.closing))
}

/// Walk candidate starts from `window.start` in `step` increments while the
/// candidate still ends by `window.end`; keep those the conflict rule admits.
///
/// `existing` must include every active booking whose buffered span can reach
/// into `window`. Output is ascending by start.
pub fn free_slots(
    existing: &[Booking],
    window: &Span,
    duration: Ms,
    step: Ms,
    buffer: Ms,
) -> Vec<Slot> {
    debug_assert!(duration > 0 && step > 0);
    let mut slots = Vec::new();
    let mut start = window.start;
    while start + duration <= window.end {
        let candidate = Span::new(start, start + duration);
        if !has_conflict(existing, &candidate, buffer, None) {
            slots.push(Slot {
                start: candidate.start,
                end: candidate.end,
                duration_minutes: candidate.duration_minutes(),
            });
        }
        start += step;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const M: Ms = MINUTE_MS;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn clock(h: u32, m: u32) -> Ms {
        at(date(), chrono::NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            resource: "R1".into(),
            start,
            end,
            requested_by: "ana".into(),
            status: StoredStatus::Active,
        }
    }

    fn starts(slots: &[Slot]) -> Vec<Ms> {
        slots.iter().map(|s| s.start).collect()
    }

    #[test]
    fn empty_day_offers_every_step() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        let slots = free_slots(&[], &window, 30 * M, 15 * M, 10 * M);
        // 09:00 .. 17:30 inclusive
        assert_eq!(slots.len(), 35);
        assert_eq!(slots[0].start, clock(9, 0));
        assert_eq!(slots.last().unwrap().end, clock(18, 0));
        assert!(slots.iter().all(|s| s.duration_minutes == 30));
    }

    #[test]
    fn booking_blocks_buffered_neighbourhood() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        let existing = [booking(clock(10, 0), clock(10, 30))];
        let slots = free_slots(&existing, &window, 30 * M, 15 * M, 10 * M);
        let s = starts(&slots);

        assert!(s.contains(&clock(9, 0)));
        assert!(s.contains(&clock(9, 15)));
        assert!(s.contains(&clock(10, 45)));
        for excluded in [clock(9, 30), clock(9, 45), clock(10, 0), clock(10, 15), clock(10, 30)] {
            assert!(!s.contains(&excluded));
        }
        assert!(s.iter().all(|&t| !(clock(9, 20) < t && t < clock(10, 40))));
    }

    #[test]
    fn off_grid_booking_frees_exact_buffer_boundary() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        // ends 10:30, so 10:40 is the first admissible start; with a 5 minute
        // step the walk lands on it
        let existing = [booking(clock(10, 0), clock(10, 30))];
        let slots = free_slots(&existing, &window, 30 * M, 5 * M, 10 * M);
        let s = starts(&slots);
        assert!(s.contains(&clock(10, 40)));
        assert!(!s.contains(&clock(10, 35)));
        assert!(s.contains(&clock(9, 20)));
        assert!(!s.contains(&clock(9, 25)));
    }

    #[test]
    fn duration_longer_than_day_yields_nothing() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        assert!(free_slots(&[], &window, 10 * 60 * M, 15 * M, 10 * M).is_empty());
    }

    #[test]
    fn last_slot_ends_exactly_at_closing() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        let slots = free_slots(&[], &window, 120 * M, 15 * M, 10 * M);
        assert_eq!(slots.last().unwrap().start, clock(16, 0));
    }

    #[test]
    fn booking_after_hours_still_blocks_late_candidates() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        let existing = [booking(clock(18, 0), clock(18, 30))];
        let slots = free_slots(&existing, &window, 30 * M, 15 * M, 10 * M);
        let s = starts(&slots);
        assert!(!s.contains(&clock(17, 30)));
        assert!(s.contains(&clock(17, 15)));
    }

    #[test]
    fn cancelled_booking_does_not_block() {
        let config = SchedulerConfig::default();
        let window = business_window(date(), &config);
        let mut b = booking(clock(10, 0), clock(10, 30));
        b.status = StoredStatus::Cancelled;
        let slots = free_slots(&[b], &window, 30 * M, 15 * M, 10 * M);
        assert_eq!(slots.len(), 35);
    }
}
