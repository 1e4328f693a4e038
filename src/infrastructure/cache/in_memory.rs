//! In-memory cache implementation using moka

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use moka::sync::Cache as MokaCache;
use tokio::time::Instant;

use crate::domain::cache::{namespace_of, Cache, CacheInfo, CacheStats, NamespaceInfo};

/// Largest serialized value accepted by default (5 MiB)
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// Serialized values larger than this are refused
    pub max_entry_bytes: usize,
    /// Whether per-namespace counters are kept
    pub stats_enabled: bool,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            stats_enabled: true,
        }
    }
}

impl InMemoryCacheConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = bytes;
        self
    }

    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }
}

/// Cache entry stored in moka
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Serialized JSON value
    data: Arc<str>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.age(now) >= self.ttl
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.ttl.checked_sub(self.age(now)).filter(|d| !d.is_zero())
    }
}

/// Invalidation counters
///
/// A namespace's epoch is its own clear count plus the whole-store one.
#[derive(Debug, Default)]
struct Epochs {
    all: u64,
    namespaces: HashMap<String, u64>,
}

impl Epochs {
    fn of(&self, namespace: &str) -> u64 {
        self.all + self.namespaces.get(namespace).copied().unwrap_or(0)
    }
}

/// Thread-safe in-memory TTL store backed by moka
///
/// Expiry is judged per entry against the tokio clock, lazily on read and in
/// bulk by [`Cache::sweep_expired`]. Moka only bounds the entry count.
#[derive(Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
    stats: RwLock<HashMap<String, CacheStats>>,
    /// Held across clears and guarded inserts
    epochs: Mutex<Epochs>,
    config: InMemoryCacheConfig,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .build();

        Self {
            cache,
            stats: RwLock::new(HashMap::new()),
            epochs: Mutex::new(Epochs::default()),
            config,
        }
    }

    pub fn config(&self) -> &InMemoryCacheConfig {
        &self.config
    }

    fn record(&self, key: &str, update: impl FnOnce(&mut CacheStats)) {
        if !self.config.stats_enabled {
            return;
        }

        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        update(stats.entry(namespace_of(key).to_string()).or_default());
    }

    fn epochs(&self) -> MutexGuard<'_, Epochs> {
        self.epochs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fits(&self, key: &str, value: &str) -> bool {
        if value.len() <= self.config.max_entry_bytes {
            return true;
        }

        tracing::warn!(
            key = %key,
            size_bytes = value.len(),
            max_bytes = self.config.max_entry_bytes,
            "Refusing to cache oversized value"
        );
        false
    }

    fn insert(&self, key: &str, value: String, ttl: Duration) {
        let entry = CacheEntry {
            data: Arc::from(value),
            stored_at: Instant::now(),
            ttl,
        };

        self.cache.insert(key.to_string(), entry);
        self.record(key, |s| s.sets += 1);
    }

    fn keys_where(&self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> Vec<Arc<String>> {
        self.cache
            .iter()
            .filter(|(key, entry)| predicate(key.as_str(), entry))
            .map(|(key, _)| key)
            .collect()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for InMemoryCache {
    fn get_raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();

        match self.cache.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.record(key, |s| s.hits += 1);
                Some(entry.data.to_string())
            }
            Some(_) => {
                tracing::debug!(key = %key, "Discarding expired cache entry");
                self.cache.invalidate(key);
                self.record(key, |s| s.misses += 1);
                None
            }
            None => {
                self.record(key, |s| s.misses += 1);
                None
            }
        }
    }

    fn set_raw(&self, key: &str, value: String, ttl: Duration) -> bool {
        if !self.fits(key, &value) {
            return false;
        }

        self.insert(key, value, ttl);
        true
    }

    fn epoch(&self, namespace: &str) -> u64 {
        self.epochs().of(namespace)
    }

    fn set_raw_if_epoch(&self, key: &str, value: String, ttl: Duration, epoch: u64) -> bool {
        if !self.fits(key, &value) {
            return false;
        }

        let epochs = self.epochs();
        if epochs.of(namespace_of(key)) != epoch {
            tracing::debug!(key = %key, "Namespace invalidated since the read started, not caching");
            return false;
        }

        self.insert(key, value, ttl);
        true
    }

    fn delete(&self, key: &str) -> bool {
        self.cache.remove(key).is_some()
    }

    fn clear_namespace(&self, namespace: &str) -> usize {
        let mut epochs = self.epochs();
        *epochs.namespaces.entry(namespace.to_string()).or_default() += 1;

        let keys = self.keys_where(|key, _| namespace_of(key) == namespace);

        for key in &keys {
            self.cache.invalidate(key.as_str());
        }
        self.cache.run_pending_tasks();

        if self.config.stats_enabled {
            let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
            stats.entry(namespace.to_string()).or_default().clears += 1;
        }

        tracing::debug!(namespace = %namespace, removed = keys.len(), "Cleared cache namespace");
        keys.len()
    }

    fn clear(&self) {
        let mut epochs = self.epochs();
        epochs.all += 1;

        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        tracing::debug!("Cleared whole cache");
    }

    fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.cache.get(key)?;

        match entry.remaining(now) {
            Some(remaining) => Some(remaining),
            None => {
                self.cache.invalidate(key);
                None
            }
        }
    }

    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired = self.keys_where(|_, entry| entry.is_expired(now));

        for key in &expired {
            self.cache.invalidate(key.as_str());
        }
        self.cache.run_pending_tasks();

        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Swept expired cache entries");
        }
        expired.len()
    }

    fn size(&self) -> usize {
        self.cache.run_pending_tasks();
        self.cache.entry_count() as usize
    }

    fn stats(&self, namespace: &str) -> CacheStats {
        let stats = self.stats.read().unwrap_or_else(|e| e.into_inner());
        stats.get(namespace).copied().unwrap_or_default()
    }

    fn reset_stats(&self, namespace: &str) {
        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.remove(namespace);
    }

    fn info(&self) -> CacheInfo {
        let now = Instant::now();
        let mut namespaces: BTreeMap<String, NamespaceInfo> = BTreeMap::new();

        for (key, entry) in self.cache.iter() {
            let info = namespaces.entry(namespace_of(&key).to_string()).or_default();
            info.entries += 1;
            info.size_bytes += key.len() + entry.data.len();

            if !entry.is_expired(now) {
                info.valid += 1;
                let age = entry.age(now).as_secs();
                info.age_secs = Some(info.age_secs.map_or(age, |oldest| oldest.max(age)));
            }
        }

        for (namespace, info) in namespaces.iter_mut() {
            info.stats = self.stats(namespace);
        }

        CacheInfo {
            total_bytes: namespaces.values().map(|i| i.size_bytes).sum(),
            valid_namespaces: namespaces.values().filter(|i| i.valid > 0).count(),
            namespaces,
        }
    }
}
