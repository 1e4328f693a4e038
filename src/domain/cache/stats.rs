//! Cache statistics and inspection reports

use std::collections::BTreeMap;

use serde::Serialize;

/// Usage counters for one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub clears: u64,
}

impl CacheStats {
    /// Hit rate in percent; 0 when nothing has been read yet
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;

        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / lookups as f64
        }
    }
}

/// Snapshot of one namespace's live entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamespaceInfo {
    /// Entries currently held, expired ones included until swept
    pub entries: usize,
    /// Entries still within their TTL
    pub valid: usize,
    /// Age of the oldest valid entry
    pub age_secs: Option<u64>,
    /// Serialized size of keys and values
    pub size_bytes: usize,
    pub stats: CacheStats,
}

/// Whole-store report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheInfo {
    pub namespaces: BTreeMap<String, NamespaceInfo>,
    pub total_bytes: usize,
    /// Namespaces holding at least one valid entry
    pub valid_namespaces: usize,
}
