//! Entity infrastructure - cached entity clients and write invalidation

mod client;
mod invalidator;

pub use client::{EntityCacheClient, DEFAULT_REQUEST_TIMEOUT};
pub use invalidator::MutationInvalidator;
