mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;
mod status;

pub use conflict::{find_conflict, has_conflict};
pub use error::{EngineError, ErrorKind};
pub use queries::BookingFilter;
pub use slots::{business_window, free_slots};
pub use status::{derive_status, view};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::config::SchedulerConfig;
use crate::model::*;
use crate::store::{BookingQuery, BookingStore};

/// The scheduling core: conflict detection, slot generation, status
/// derivation, and the booking lifecycle, on top of a `BookingStore`.
pub struct Engine {
    store: Arc<dyn BookingStore>,
    config: SchedulerConfig,
    /// Per-resource guards serialising read-check-write sequences. Entries
    /// live only while some task holds or waits on them.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Resource locks held by one mutation. Dropping releases them and removes
/// entries no other task has cloned.
pub(super) struct ResourceGuards<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl Drop for ResourceGuards<'_> {
    fn drop(&mut self) {
        for (name, guard) in self.held.drain(..) {
            drop(guard);
            self.locks.remove_if(&name, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

impl Engine {
    pub fn new(store: Arc<dyn BookingStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Lock every named resource, in name order so concurrent moves can't deadlock.
    pub(super) async fn lock_resources(&self, names: &[&str]) -> ResourceGuards<'_> {
        let mut sorted: Vec<&str> = names.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut guards = ResourceGuards {
            locks: &self.locks,
            held: Vec::with_capacity(sorted.len()),
        };
        for name in sorted {
            let lock = self
                .locks
                .entry(name.to_string())
                .or_default()
                .value()
                .clone();
            let guard = lock.lock_owned().await;
            guards.held.push((name.to_string(), guard));
        }
        guards
    }

    /// Conflict Detector: the first active booking on `resource` that rules
    /// out `candidate`, ignoring `exclude`.
    pub async fn find_conflict(
        &self,
        candidate: &Span,
        resource: &str,
        exclude: Option<Ulid>,
    ) -> Result<Option<Ulid>, EngineError> {
        let buffer = self.config.buffer_ms;
        let query = BookingQuery::active_on(resource, candidate.buffered(buffer)).excluding(exclude);
        let existing = self.store.find_bookings(&query).await?;
        Ok(find_conflict(&existing, candidate, buffer, exclude))
    }

    pub async fn has_conflict(
        &self,
        candidate: &Span,
        resource: &str,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        Ok(self.find_conflict(candidate, resource, exclude).await?.is_some())
    }
}
