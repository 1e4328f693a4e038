//! Domain layer - Cache, loading and transport abstractions

pub mod cache;
pub mod entity;
pub mod error;
pub mod load;
pub mod transport;

pub use cache::{Cache, CacheExt, CacheKeyBuilder, QueryDescriptor};
pub use entity::{EntityDescriptor, EntityKind, Page};
pub use error::DomainError;
pub use load::{LoadOutcome, LoadScope, LoadState, LoadToken, RequestCoordinator};
pub use transport::{Transport, TransportRequest};
