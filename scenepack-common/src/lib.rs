//! # Scenepack Common Library
//!
//! Shared code for the scenepack indexer and its tooling:
//! - Store schema initialization and record models
//! - Event types (ScanEvent enum) and the EventBus
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
