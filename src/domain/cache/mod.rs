//! Cache domain - TTL store abstraction and key derivation

mod key;
mod repository;
mod stats;

pub use key::{
    namespace_of, CacheKeyBuilder, CacheKeyParams, FilterValue, QueryDescriptor,
    DEFAULT_PAGE_SIZE,
};
pub use repository::{Cache, CacheExt};
pub use stats::{CacheInfo, CacheStats, NamespaceInfo};
