//! Cache infrastructure - Cache implementations

mod in_memory;
mod janitor;

pub use in_memory::{InMemoryCache, InMemoryCacheConfig, DEFAULT_MAX_ENTRY_BYTES};
pub use janitor::{CacheJanitor, DEFAULT_CLEANUP_INTERVAL};
