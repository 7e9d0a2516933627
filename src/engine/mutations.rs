use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{now_ms, validate_duration, validate_span};
use super::status::derive_status;
use super::{Engine, EngineError, ResourceGuards};

fn validate_resource_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Invalid("resource is required"));
    }
    if name.len() > MAX_RESOURCE_NAME_LEN {
        return Err(EngineError::LimitExceeded("resource name too long"));
    }
    Ok(())
}

fn validate_requester(who: &str) -> Result<(), EngineError> {
    if who.trim().is_empty() {
        return Err(EngineError::Invalid("requestedBy is required"));
    }
    if who.len() > MAX_REQUESTER_LEN {
        return Err(EngineError::LimitExceeded("requestedBy too long"));
    }
    Ok(())
}

impl Engine {
    async fn fetch(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.store
            .find_booking_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Fetch `id` with its current resource (and `also`, if given) locked.
    /// A concurrent move between the fetch and the lock means the wrong
    /// resource is held, so release and try again.
    async fn fetch_locked(
        &self,
        id: Ulid,
        also: Option<&str>,
    ) -> Result<(Booking, ResourceGuards<'_>), EngineError> {
        loop {
            let seen = self.fetch(id).await?;
            let mut names = vec![seen.resource.as_str()];
            names.extend(also);
            let guards = self.lock_resources(&names).await;
            let current = self.fetch(id).await?;
            if current.resource == seen.resource {
                return Ok((current, guards));
            }
            debug!("booking {id} moved to {} while locking, retrying", current.resource);
        }
    }

    fn reject_conflict(&self, resource: &str, other: Ulid) -> EngineError {
        metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        debug!("rejected booking on {resource}: conflicts with {other}");
        EngineError::Conflict(other)
    }

    pub async fn create_booking(
        &self,
        resource: &str,
        start: Ms,
        end: Ms,
        requested_by: &str,
    ) -> Result<Booking, EngineError> {
        validate_resource_name(resource)?;
        validate_requester(requested_by)?;
        let span = validate_span(start, end)?;
        validate_duration(&span, self.config.min_duration_ms, self.config.max_duration_ms)?;

        let _guards = self.lock_resources(&[resource]).await;
        if let Some(other) = self.find_conflict(&span, resource, None).await? {
            return Err(self.reject_conflict(resource, other));
        }

        let booking = Booking {
            id: Ulid::new(),
            resource: resource.to_string(),
            start: span.start,
            end: span.end,
            requested_by: requested_by.to_string(),
            status: StoredStatus::Active,
        };
        self.store.insert_booking(booking.clone()).await?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            "booking {} created on {} [{}, {}) for {}",
            booking.id, booking.resource, booking.start, booking.end, booking.requested_by
        );
        Ok(booking)
    }

    /// Merge `patch` over the stored booking. Time changes re-run ordering and
    /// duration checks; any schedule change on an active booking re-runs
    /// conflict detection with the booking itself excluded.
    pub async fn update_booking(&self, id: Ulid, patch: BookingPatch) -> Result<Booking, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::Invalid("no fields to update"));
        }
        if let Some(ref r) = patch.resource {
            validate_resource_name(r)?;
        }
        if let Some(ref who) = patch.requested_by {
            validate_requester(who)?;
        }

        let (current, _guards) = self.fetch_locked(id, patch.resource.as_deref()).await?;

        let merged = Booking {
            id,
            resource: patch.resource.clone().unwrap_or_else(|| current.resource.clone()),
            start: patch.start.unwrap_or(current.start),
            end: patch.end.unwrap_or(current.end),
            requested_by: patch.requested_by.clone().unwrap_or_else(|| current.requested_by.clone()),
            status: current.status,
        };

        if patch.start.is_some() || patch.end.is_some() {
            let span = validate_span(merged.start, merged.end)?;
            validate_duration(&span, self.config.min_duration_ms, self.config.max_duration_ms)?;
        }
        if patch.touches_schedule()
            && merged.is_active()
            && let Some(other) = self.find_conflict(&merged.span(), &merged.resource, Some(id)).await?
        {
            return Err(self.reject_conflict(&merged.resource, other));
        }

        self.store.update_booking(merged.clone()).await?;
        info!(
            "booking {} updated on {} [{}, {})",
            merged.id, merged.resource, merged.start, merged.end
        );
        Ok(merged)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.cancel_booking_at(id, now_ms()).await
    }

    /// ACTIVE → CANCELLED, allowed while the booking is upcoming or ongoing at `now`.
    pub async fn cancel_booking_at(&self, id: Ulid, now: Ms) -> Result<Booking, EngineError> {
        let (mut booking, _guards) = self.fetch_locked(id, None).await?;

        match derive_status(&booking.span(), booking.status, now) {
            BookingStatus::Cancelled => return Err(EngineError::AlreadyCancelled(id)),
            BookingStatus::Past => return Err(EngineError::AlreadyPast(id)),
            BookingStatus::Upcoming | BookingStatus::Ongoing => {}
        }

        booking.status = StoredStatus::Cancelled;
        self.store.update_booking(booking.clone()).await?;
        info!("booking {id} on {} cancelled", booking.resource);
        Ok(booking)
    }

    /// Unconditional removal; no scheduling rules apply.
    pub async fn delete_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let removed = self
            .store
            .delete_booking(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        info!("booking {id} on {} deleted", removed.resource);
        Ok(removed)
    }

    /// Register a resource. `Ok(false)` if the name is already taken.
    pub async fn create_resource(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<bool, EngineError> {
        validate_resource_name(name)?;
        if let Some(ref d) = description
            && d.len() > MAX_DESCRIPTION_LEN
        {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if self.store.list_resources().await?.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        let created = self
            .store
            .create_resource(Resource {
                name: name.to_string(),
                description,
            })
            .await?;
        if created {
            info!("resource {name} created");
        }
        Ok(created)
    }
}
