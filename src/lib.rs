//! Brokerage entity cache
//!
//! Read-through caching for the brokerage admin backend with:
//! - TTL-based in-memory store with per-entity lifetimes
//! - Deterministic cache keys for list queries
//! - Race-free, cancellable loading per scope (last request wins)
//! - Namespace invalidation after successful writes

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod state;

pub use config::AppConfig;
pub use state::AppState;

use std::sync::Arc;

use tracing::info;

use infrastructure::cache::{InMemoryCache, InMemoryCacheConfig};
use infrastructure::http::HttpTransport;

/// Create the application state from configuration
///
/// Must run inside a tokio runtime when the cache janitor is enabled.
pub async fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let cache = Arc::new(InMemoryCache::with_config(
        InMemoryCacheConfig::default()
            .with_max_capacity(config.cache.max_capacity)
            .with_max_entry_bytes(config.cache.max_entry_bytes)
            .with_stats(config.cache.stats_enabled),
    ));

    let transport = Arc::new(HttpTransport::new(
        config.api.base_url.clone(),
        config.api.timeout(),
    )?);

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        max_capacity = config.cache.max_capacity,
        "Entity cache initialized"
    );

    let state = AppState::new(cache, transport).with_request_timeout(config.api.timeout());

    Ok(match config.cache.cleanup_interval() {
        Some(period) => state.with_janitor(period),
        None => state,
    })
}
