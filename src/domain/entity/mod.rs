//! Entity domain - which backend resources are cached and how

mod descriptor;
mod page;

pub use descriptor::{EntityDescriptor, EntityKind, TtlTier};
pub use page::Page;
