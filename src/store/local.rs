use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::engine::find_conflict;
use crate::model::*;
use crate::wal::Wal;

use super::journal::Journal;
use super::{BookingQuery, BookingStore, StoreError};

pub type SharedCalendar = Arc<RwLock<Calendar>>;

/// All bookings (any status) on one resource, sorted by `start`.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    pub bookings: Vec<Booking>,
}

impl Calendar {
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.start, |b| b.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps `query`. Binary search skips everything
    /// starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end > query.start)
    }
}

/// In-process booking store.
///
/// With an exclusion buffer, inserts and updates are rejected when an active
/// booking would sit within `buffer` of another active booking on the same
/// resource; the check and the write share one calendar write lock. With a
/// journal, every mutation is made durable before it becomes visible.
///
/// Calendars are kept for every resource that has ever held a booking, even
/// once emptied; the count is bounded by the resource names clients use.
pub struct LocalStore {
    calendars: DashMap<String, SharedCalendar>,
    /// booking id → resource name
    index: DashMap<Ulid, String>,
    resources: DashMap<String, Resource>,
    exclusion_buffer: Option<Ms>,
    journal: Option<Journal>,
    /// Held shared by every mutation from check to apply, and exclusively by
    /// `compact` from snapshot until the rewritten journal is in place.
    compaction: RwLock<()>,
}

impl LocalStore {
    pub fn in_memory(exclusion_buffer: Option<Ms>) -> Self {
        Self {
            calendars: DashMap::new(),
            index: DashMap::new(),
            resources: DashMap::new(),
            exclusion_buffer,
            journal: None,
            compaction: RwLock::new(()),
        }
    }

    /// Replay the journal at `path`, then journal all further mutations to it.
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path, exclusion_buffer: Option<Ms>) -> std::io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let mut store = Self::in_memory(exclusion_buffer);
        for event in &events {
            store.replay_event(event);
        }
        tracing::info!(
            "replayed {} journal events ({} bookings, {} resources)",
            events.len(),
            store.index.len(),
            store.resources.len()
        );
        store.journal = Some(Journal::spawn(wal));
        Ok(store)
    }

    fn calendar(&self, resource: &str) -> SharedCalendar {
        if let Some(cal) = self.calendars.get(resource) {
            return cal.value().clone();
        }
        self.calendars
            .entry(resource.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn existing_calendar(&self, resource: &str) -> Option<SharedCalendar> {
        self.calendars.get(resource).map(|e| e.value().clone())
    }

    async fn persist(&self, event: &Event) -> Result<(), StoreError> {
        match &self.journal {
            Some(journal) => journal.append(event).await,
            None => Ok(()),
        }
    }

    fn check_exclusion(&self, cal: &Calendar, booking: &Booking) -> Result<(), StoreError> {
        let Some(buffer) = self.exclusion_buffer else {
            return Ok(());
        };
        if !booking.is_active() {
            return Ok(());
        }
        let reach = booking.span().buffered(buffer);
        match find_conflict(cal.overlapping(&reach), &booking.span(), buffer, Some(booking.id)) {
            Some(other) => Err(StoreError::ExclusionViolation(other)),
            None => Ok(()),
        }
    }

    /// Apply a journal event during startup. Sole owner, so locks are uncontended.
    fn replay_event(&mut self, event: &Event) {
        match event {
            Event::ResourceCreated { name, description } => {
                self.resources.insert(
                    name.clone(),
                    Resource {
                        name: name.clone(),
                        description: description.clone(),
                    },
                );
            }
            Event::BookingCreated { booking } | Event::BookingUpdated { booking } => {
                if let Some(old) = self.index.get(&booking.id).map(|e| e.value().clone())
                    && let Some(cal) = self.existing_calendar(&old)
                    && let Ok(mut guard) = cal.try_write()
                {
                    guard.remove(booking.id);
                }
                let cal = self.calendar(&booking.resource);
                if let Ok(mut guard) = cal.try_write() {
                    guard.insert(booking.clone());
                }
                self.index.insert(booking.id, booking.resource.clone());
            }
            Event::BookingDeleted { id, resource } => {
                if let Some(cal) = self.existing_calendar(resource)
                    && let Ok(mut guard) = cal.try_write()
                {
                    guard.remove(*id);
                }
                self.index.remove(id);
            }
        }
    }

    /// Rewrite the journal as the minimal event list recreating current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let _gate = self.compaction.write().await;
        let mut resources: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        let mut events: Vec<Event> = resources
            .into_iter()
            .map(|r| Event::ResourceCreated {
                name: r.name,
                description: r.description,
            })
            .collect();

        let calendars: Vec<SharedCalendar> = self.calendars.iter().map(|e| e.value().clone()).collect();
        for cal in calendars {
            let guard = cal.read().await;
            events.extend(
                guard
                    .bookings
                    .iter()
                    .map(|b| Event::BookingCreated { booking: b.clone() }),
            );
        }
        journal.compact(events).await
    }

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.journal {
            Some(journal) => journal.appends_since_compact().await,
            None => 0,
        }
    }

    pub fn booking_count(&self) -> usize {
        self.index.len()
    }
}

#[async_trait]
impl BookingStore for LocalStore {
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>, StoreError> {
        let calendars: Vec<SharedCalendar> = match &query.resource {
            Some(name) => self.existing_calendar(name).into_iter().collect(),
            None => self.calendars.iter().map(|e| e.value().clone()).collect(),
        };

        let mut found = Vec::new();
        for cal in calendars {
            let guard = cal.read().await;
            match query.overlapping {
                Some(window) => found.extend(
                    guard.overlapping(&window).filter(|b| query.matches(b)).cloned(),
                ),
                None => found.extend(guard.bookings.iter().filter(|b| query.matches(b)).cloned()),
            }
        }
        found.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn find_booking_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        let Some(resource) = self.index.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let Some(cal) = self.existing_calendar(&resource) else {
            return Ok(None);
        };
        let guard = cal.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        if self.index.contains_key(&booking.id) {
            return Err(StoreError::DuplicateId(booking.id));
        }
        let _gate = self.compaction.read().await;
        let cal = self.calendar(&booking.resource);
        let mut guard = cal.write().await;
        self.check_exclusion(&guard, &booking)?;

        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist(&event).await?;
        self.index.insert(booking.id, booking.resource.clone());
        guard.insert(booking);
        Ok(())
    }

    async fn update_booking(&self, booking: Booking) -> Result<(), StoreError> {
        let _gate = self.compaction.read().await;
        let old_resource = self
            .index
            .get(&booking.id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(booking.id))?;
        let event = Event::BookingUpdated { booking: booking.clone() };

        if old_resource == booking.resource {
            let cal = self.calendar(&booking.resource);
            let mut guard = cal.write().await;
            if guard.get(booking.id).is_none() {
                return Err(StoreError::NotFound(booking.id));
            }
            self.check_exclusion(&guard, &booking)?;
            self.persist(&event).await?;
            guard.remove(booking.id);
            guard.insert(booking);
            return Ok(());
        }

        // Moving between resources: lock both calendars in name order.
        let from = self.calendar(&old_resource);
        let to = self.calendar(&booking.resource);
        let (mut from_guard, mut to_guard) = if old_resource < booking.resource {
            let f = from.write_owned().await;
            let t = to.write_owned().await;
            (f, t)
        } else {
            let t = to.write_owned().await;
            let f = from.write_owned().await;
            (f, t)
        };
        if from_guard.get(booking.id).is_none() {
            return Err(StoreError::NotFound(booking.id));
        }
        self.check_exclusion(&to_guard, &booking)?;
        self.persist(&event).await?;
        from_guard.remove(booking.id);
        self.index.insert(booking.id, booking.resource.clone());
        to_guard.insert(booking);
        Ok(())
    }

    async fn delete_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        let _gate = self.compaction.read().await;
        let Some(resource) = self.index.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let cal = self.calendar(&resource);
        let mut guard = cal.write().await;
        if guard.get(id).is_none() {
            return Ok(None);
        }
        self.persist(&Event::BookingDeleted { id, resource }).await?;
        self.index.remove(&id);
        Ok(guard.remove(id))
    }

    async fn create_resource(&self, resource: Resource) -> Result<bool, StoreError> {
        if self.resources.contains_key(&resource.name) {
            return Ok(false);
        }
        let _gate = self.compaction.read().await;
        let event = Event::ResourceCreated {
            name: resource.name.clone(),
            description: resource.description.clone(),
        };
        self.persist(&event).await?;
        Ok(self.resources.insert(resource.name.clone(), resource).is_none())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let mut all: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
