//! Load coordination - race-free, cancellable loading per scope

mod scope;
mod token;

pub use scope::{LoadOutcome, LoadScope, LoadState};
pub use token::{LoadToken, RequestCoordinator};
