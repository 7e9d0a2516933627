use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end <= start {
        return Err(EngineError::InvalidSpan);
    }
    Ok(Span::new(start, end))
}

/// Duration bounds, inclusive on both ends.
pub(crate) fn validate_duration(span: &Span, min: Ms, max: Ms) -> Result<(), EngineError> {
    let d = span.duration_ms();
    if d < min || d > max {
        return Err(EngineError::DurationOutOfRange {
            minutes: d / MINUTE_MS,
            min: min / MINUTE_MS,
            max: max / MINUTE_MS,
        });
    }
    Ok(())
}

/// First active booking in `existing` that rules out `candidate`.
///
/// The buffer is applied to the stored side only: an existing booking blocks
/// `[start - buffer, end + buffer)`, and the candidate is tested raw. Cancelled
/// bookings and `exclude` never conflict.
pub fn find_conflict<'a>(
    existing: impl IntoIterator<Item = &'a Booking>,
    candidate: &Span,
    buffer: Ms,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    existing
        .into_iter()
        .filter(|b| b.is_active() && Some(b.id) != exclude)
        .find(|b| b.span().buffered(buffer).overlaps(candidate))
        .map(|b| b.id)
}

pub fn has_conflict<'a>(
    existing: impl IntoIterator<Item = &'a Booking>,
    candidate: &Span,
    buffer: Ms,
    exclude: Option<Ulid>,
) -> bool {
    find_conflict(existing, candidate, buffer, exclude).is_some()
}
