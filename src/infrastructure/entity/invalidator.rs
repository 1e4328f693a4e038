//! Cache eviction after successful writes

use std::sync::Arc;

use crate::domain::cache::Cache;
use crate::infrastructure::metrics;

/// Metrics label of a whole-store invalidation
pub const ALL_NAMESPACES: &str = "*";

/// Evicts every cached read of an entity once a write to it has succeeded
///
/// Eviction is per namespace: list pages of any size and the simplified
/// projection all go together.
#[derive(Debug, Clone)]
pub struct MutationInvalidator {
    cache: Arc<dyn Cache>,
}

impl MutationInvalidator {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Clears one entity namespace, returns the number of evicted entries
    pub fn invalidate(&self, namespace: &str) -> usize {
        let removed = self.cache.clear_namespace(namespace);

        tracing::info!(namespace = %namespace, removed, "Invalidated entity cache");
        metrics::record_invalidation(namespace, removed);

        removed
    }

    /// Clears several namespaces, e.g. after a write touching related entities
    pub fn invalidate_many<'a>(&self, namespaces: impl IntoIterator<Item = &'a str>) -> usize {
        namespaces.into_iter().map(|ns| self.invalidate(ns)).sum()
    }

    /// Clears the whole store, returns the number of evicted entries
    ///
    /// Recorded in metrics under the `*` namespace.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.cache.size();
        self.cache.clear();

        tracing::info!(removed, "Invalidated all entity caches");
        metrics::record_invalidation(ALL_NAMESPACES, removed);

        removed
    }
}
