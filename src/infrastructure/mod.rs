//! Infrastructure layer - External service implementations

pub mod cache;
pub mod entity;
pub mod http;
pub mod logging;
pub mod metrics;
