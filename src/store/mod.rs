mod journal;
mod local;

pub use local::{Calendar, LocalStore};

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("booking not found: {0}")]
    NotFound(Ulid),
    #[error("booking id already exists: {0}")]
    DuplicateId(Ulid),
    /// Two active bookings on one resource would sit closer than the buffer.
    #[error("exclusion constraint violated by booking: {0}")]
    ExclusionViolation(Ulid),
    #[error("journal error: {0}")]
    Journal(String),
}

/// Filter for `find_bookings`. Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingQuery {
    pub resource: Option<String>,
    /// Bookings whose `[start, end)` overlaps this window.
    pub overlapping: Option<Span>,
    /// Bookings whose start instant falls in this window.
    pub starts_within: Option<Span>,
    pub requested_by: Option<String>,
    pub exclude_cancelled: bool,
    pub exclude_id: Option<Ulid>,
}

impl BookingQuery {
    /// Active bookings on `resource` overlapping `window`.
    pub fn active_on(resource: &str, window: Span) -> Self {
        Self {
            resource: Some(resource.to_string()),
            overlapping: Some(window),
            exclude_cancelled: true,
            ..Default::default()
        }
    }

    pub fn excluding(mut self, id: Option<Ulid>) -> Self {
        self.exclude_id = id;
        self
    }

    pub fn matches(&self, b: &Booking) -> bool {
        if self.exclude_cancelled && !b.is_active() {
            return false;
        }
        if self.exclude_id == Some(b.id) {
            return false;
        }
        if let Some(ref r) = self.resource
            && *r != b.resource
        {
            return false;
        }
        if let Some(ref who) = self.requested_by
            && *who != b.requested_by
        {
            return false;
        }
        if let Some(w) = self.overlapping
            && !b.span().overlaps(&w)
        {
            return false;
        }
        if let Some(w) = self.starts_within
            && !(w.start <= b.start && b.start < w.end)
        {
            return false;
        }
        true
    }
}

/// What the scheduling core needs from persistence. Implementations own
/// resource enumeration, ordering, and the authoritative exclusion constraint.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Matching bookings sorted by start time, then id.
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>, StoreError>;

    async fn find_booking_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError>;

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError>;

    /// Replace the stored booking with the same id. May move it to another resource.
    async fn update_booking(&self, booking: Booking) -> Result<(), StoreError>;

    async fn delete_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError>;

    /// Returns `false` if a resource with this name already exists.
    async fn create_resource(&self, resource: Resource) -> Result<bool, StoreError>;

    /// All resources sorted by name.
    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(resource: &str, start: Ms, end: Ms, who: &str) -> Booking {
        Booking {
            id: Ulid::new(),
            resource: resource.into(),
            start,
            end,
            requested_by: who.into(),
            status: StoredStatus::Active,
        }
    }

    #[test]
    fn empty_query_matches_all() {
        let mut b = booking("A", 100, 200, "ana");
        assert!(BookingQuery::default().matches(&b));
        b.status = StoredStatus::Cancelled;
        assert!(BookingQuery::default().matches(&b));
    }

    #[test]
    fn active_on_filters_resource_window_and_status() {
        let q = BookingQuery::active_on("A", Span::new(150, 300));
        assert!(q.matches(&booking("A", 100, 200, "ana")));
        assert!(!q.matches(&booking("B", 100, 200, "ana")));
        assert!(!q.matches(&booking("A", 300, 400, "ana"))); // touching
        let mut c = booking("A", 100, 200, "ana");
        c.status = StoredStatus::Cancelled;
        assert!(!q.matches(&c));
    }

    #[test]
    fn exclude_id_and_requester() {
        let b = booking("A", 100, 200, "ana");
        let q = BookingQuery::default().excluding(Some(b.id));
        assert!(!q.matches(&b));

        let q = BookingQuery {
            requested_by: Some("bo".into()),
            ..Default::default()
        };
        assert!(!q.matches(&b));
    }

    #[test]
    fn starts_within_is_half_open() {
        let q = BookingQuery {
            starts_within: Some(Span::new(100, 200)),
            ..Default::default()
        };
        assert!(q.matches(&booking("A", 100, 300, "ana")));
        assert!(q.matches(&booking("A", 199, 300, "ana")));
        assert!(!q.matches(&booking("A", 200, 300, "ana")));
        assert!(!q.matches(&booking("A", 50, 150, "ana")));
    }
}
