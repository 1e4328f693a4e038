//! Cache trait definition

use std::fmt::Debug;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use super::stats::{CacheInfo, CacheStats};

/// In-memory key-value store with per-entry TTL
///
/// Values are JSON strings so one store can hold every entity type; use
/// [`CacheExt`] for typed access. Operations are synchronous and cannot
/// fail: a missing or expired key is simply a miss.
pub trait Cache: Send + Sync + Debug {
    /// Gets a raw JSON value; expired entries are discarded and reported as a miss
    fn get_raw(&self, key: &str) -> Option<String>;

    /// Stores a raw JSON value, overwriting any previous one
    ///
    /// Returns `false` when the store refused the value (oversized).
    fn set_raw(&self, key: &str, value: String, ttl: Duration) -> bool;

    /// Invalidation epoch of `namespace`
    ///
    /// Grows every time the namespace is cleared, by
    /// [`clear_namespace`](Self::clear_namespace) or [`clear`](Self::clear).
    fn epoch(&self, namespace: &str) -> u64;

    /// Stores a raw JSON value only if the key's namespace is still at `epoch`
    ///
    /// The epoch check and the insert happen atomically, so a value read
    /// before an invalidation can never land after it. Returns `false` when
    /// the namespace moved on or the value was refused.
    fn set_raw_if_epoch(&self, key: &str, value: String, ttl: Duration, epoch: u64) -> bool;

    /// Deletes a single entry, returns whether it existed
    fn delete(&self, key: &str) -> bool;

    /// Deletes every entry under `namespace`, returns how many were removed
    fn clear_namespace(&self, namespace: &str) -> usize;

    /// Deletes everything
    fn clear(&self);

    /// Checks for a live entry without touching statistics
    fn exists(&self, key: &str) -> bool {
        self.ttl(key).is_some()
    }

    /// Remaining lifetime of a live entry
    fn ttl(&self, key: &str) -> Option<Duration>;

    /// Removes every expired entry, returns how many were removed
    fn sweep_expired(&self) -> usize;

    /// Number of entries held, expired ones included until swept
    fn size(&self) -> usize;

    /// Counters for one namespace
    fn stats(&self, namespace: &str) -> CacheStats;

    /// Resets the counters of one namespace
    fn reset_stats(&self, namespace: &str);

    /// Per-namespace report of the current contents
    fn info(&self) -> CacheInfo;
}

/// Extension trait providing typed get/set operations
pub trait CacheExt: Cache {
    /// Gets a typed value
    ///
    /// A stored value that no longer deserializes into `V` is dropped and
    /// reported as a miss.
    fn get<V>(&self, key: &str) -> Option<V>
    where
        V: DeserializeOwned,
    {
        let data = self.get_raw(key)?;

        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.delete(key);
                None
            }
        }
    }

    /// Sets a typed value, returns whether it was stored
    fn set<V>(&self, key: &str, value: &V, ttl: Duration) -> bool
    where
        V: Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(data) => self.set_raw(key, data, ttl),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache value");
                false
            }
        }
    }

    /// Typed [`Cache::set_raw_if_epoch`]
    fn set_if_epoch<V>(&self, key: &str, value: &V, ttl: Duration, epoch: u64) -> bool
    where
        V: Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(data) => self.set_raw_if_epoch(key, data, ttl, epoch),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache value");
                false
            }
        }
    }
}

// Blanket implementation for all types implementing Cache
impl<T: Cache + ?Sized> CacheExt for T {}
