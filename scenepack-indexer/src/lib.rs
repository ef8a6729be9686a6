//! scenepack-indexer library interface
//!
//! Store operations, the extraction orchestrator and scene assembly. The
//! `scenepack-indexer` binary is a thin CLI over these modules.

pub mod db;
pub mod extraction;
pub mod loader;
pub mod services;
pub mod utils;

pub use scenepack_common::{Error, Result};
