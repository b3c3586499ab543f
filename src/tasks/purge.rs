//! Expiration Purge Task
//!
//! Background task that periodically sweeps expired entries out of a
//! data container.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::container::DataContainer;
use crate::{CacheKey, CacheValue};

/// Spawns a background task that periodically purges expired entries.
///
/// The task sleeps for the interval between sweeps. Each sweep removes
/// every expired entry and reports them to expiration listeners as one
/// batch; entries that are still live are not touched.
///
/// # Arguments
/// * `container` - Container to sweep
/// * `purge_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, used to abort it on shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_purge_task(cache.container().clone(), 5);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_purge_task<K: CacheKey, V: CacheValue>(
    container: Arc<DataContainer<K, V>>,
    purge_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(purge_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiration purge task with interval of {} seconds",
            purge_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let purged = container.purge_expired();
            if purged > 0 {
                info!("Expiration purge: removed {} expired entries", purged);
            } else {
                debug!("Expiration purge: no expired entries found");
            }
        }
    })
}
