use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type inside the core.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_ms() / MINUTE_MS
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// `[start - buffer, end + buffer)`. Only ever used for conflict tests;
    /// stored bookings keep their raw times.
    pub fn buffered(&self, buffer: Ms) -> Span {
        Span {
            start: self.start.saturating_sub(buffer),
            end: self.end.saturating_add(buffer),
        }
    }
}

/// Persisted part of a booking's status. Time-based labels are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoredStatus {
    #[default]
    Active,
    Cancelled,
}

/// Display status, derived at read time from the stored status and "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Upcoming,
    Ongoing,
    Past,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource: String,
    pub start: Ms,
    pub end: Ms,
    pub requested_by: String,
    pub status: StoredStatus,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span {
            start: self.start,
            end: self.end,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StoredStatus::Active
    }
}

/// Proposed changes for an update. `None` keeps the existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub resource: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub requested_by: Option<String>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.resource.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.requested_by.is_none()
    }

    pub fn touches_schedule(&self) -> bool {
        self.resource.is_some() || self.start.is_some() || self.end.is_some()
    }
}

/// A booking paired with its derived status, as returned by reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingView {
    pub booking: Booking,
    pub status: BookingStatus,
}

/// Candidate free window. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: Ms,
    pub end: Ms,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub description: Option<String>,
}

/// Journal record format. Cancellation and field edits are both `BookingUpdated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated { name: String, description: Option<String> },
    BookingCreated { booking: Booking },
    BookingUpdated { booking: Booking },
    BookingDeleted { id: Ulid, resource: String },
}

// ── Calendar helpers (single implicit zone: UTC) ─────────────────

pub fn at(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}

pub fn day_span(date: NaiveDate) -> Span {
    let start = at(date, NaiveTime::MIN);
    Span::new(start, start + 24 * 60 * MINUTE_MS)
}

pub fn to_utc(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

pub fn from_utc(dt: &DateTime<Utc>) -> Ms {
    dt.timestamp_millis()
}
