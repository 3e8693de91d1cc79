//! Filesystem traversal and per-entry resource building.

pub mod resource;
pub mod walker;

pub use resource::Resource;
pub use walker::WalkOptions;
