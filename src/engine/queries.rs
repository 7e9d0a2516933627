use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::store::BookingQuery;

use super::slots::{business_window, free_slots};
use super::status::view;
use super::{Engine, EngineError};

/// Read-side filter. Dates select bookings that start on that calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub resource: Option<String>,
    pub date: Option<NaiveDate>,
    pub requested_by: Option<String>,
}

impl BookingFilter {
    fn to_query(&self) -> BookingQuery {
        BookingQuery {
            resource: self.resource.clone(),
            starts_within: self.date.map(day_span),
            requested_by: self.requested_by.clone(),
            ..Default::default()
        }
    }
}

impl Engine {
    pub async fn get_booking(&self, id: Ulid, now: Ms) -> Result<BookingView, EngineError> {
        let booking = self
            .store
            .find_booking_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        Ok(view(booking, now))
    }

    /// Bookings of any status matching `filter`, ascending by start.
    pub async fn list_bookings(
        &self,
        filter: &BookingFilter,
        now: Ms,
    ) -> Result<Vec<BookingView>, EngineError> {
        let bookings = self.store.find_bookings(&filter.to_query()).await?;
        Ok(bookings.into_iter().map(|b| view(b, now)).collect())
    }

    /// Non-cancelled bookings keyed by resource name.
    pub async fn bookings_grouped_by_resource(
        &self,
        filter: &BookingFilter,
        now: Ms,
    ) -> Result<BTreeMap<String, Vec<BookingView>>, EngineError> {
        let mut query = filter.to_query();
        query.exclude_cancelled = true;
        let mut grouped: BTreeMap<String, Vec<BookingView>> = BTreeMap::new();
        for booking in self.store.find_bookings(&query).await? {
            grouped
                .entry(booking.resource.clone())
                .or_default()
                .push(view(booking, now));
        }
        Ok(grouped)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, EngineError> {
        Ok(self.store.list_resources().await?)
    }

    /// Slot Generator: every admissible `duration`-minute start within business
    /// hours on `date`, on the configured grid. `None` uses the default duration.
    pub async fn available_slots(
        &self,
        resource: &str,
        date: NaiveDate,
        duration_minutes: Option<i64>,
    ) -> Result<Vec<Slot>, EngineError> {
        let minutes = duration_minutes.unwrap_or(self.config.default_slot_minutes);
        if minutes <= 0 {
            return Err(EngineError::Invalid("duration must be positive"));
        }
        let duration = minutes.saturating_mul(MINUTE_MS);
        let window = business_window(date, &self.config);
        if duration > window.duration_ms() {
            return Ok(Vec::new());
        }

        // Widen by the buffer so bookings just outside business hours still count.
        let buffer = self.config.buffer_ms;
        let query = BookingQuery::active_on(resource, window.buffered(buffer));
        let existing = self.store.find_bookings(&query).await?;
        Ok(free_slots(&existing, &window, duration, self.config.slot_step_ms, buffer))
    }
}
