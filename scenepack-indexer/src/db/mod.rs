//! Store operations
//!
//! One module per table. Every function takes `&SqlitePool` and holds a
//! pooled connection only for its own statement or transaction, so worker
//! tasks never serialize behind each other for the length of an extraction.

pub mod assets;
pub mod packs;
pub mod patterns;
pub mod properties;
pub mod scan_queue;
pub mod stats;
pub mod tags;

pub use assets::{AssetFilters, TagQuery};
pub use stats::StoreStats;
