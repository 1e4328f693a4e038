//! Periodic removal of expired cache entries

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::cache::Cache;

/// Default sweep period
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Background task sweeping expired entries on a fixed period
///
/// Reads already ignore expired entries; the janitor only bounds memory held
/// by keys nobody reads again. The task stops when the janitor is dropped.
#[derive(Debug)]
pub struct CacheJanitor {
    handle: JoinHandle<()>,
}

impl CacheJanitor {
    /// Spawns the sweep loop on the current tokio runtime
    pub fn spawn(cache: Arc<dyn Cache>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let removed = cache.sweep_expired();
                if removed > 0 {
                    tracing::info!(removed, remaining = cache.size(), "Cache cleanup completed");
                }
            }
        });

        tracing::debug!(period_secs = period.as_secs(), "Cache janitor started");
        Self { handle }
    }

    /// Stops the sweep loop
    pub fn stop(self) {}

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for CacheJanitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
