use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::store::LocalStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the journal once enough events pile up.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &LocalStore, threshold: u64) -> bool {
    let pending = store.appends_since_compact().await;
    if pending < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(
                "compacted journal after {pending} appends ({} bookings)",
                store.booking_count()
            );
            true
        }
        Err(e) => {
            error!("journal compaction failed: {e}");
            false
        }
    }
}
