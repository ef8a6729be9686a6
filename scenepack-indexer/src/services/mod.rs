//! Scan services
//!
//! - [`classifier`]: name classification and geometry tiers
//! - [`file_scanner`]: container file discovery
//! - [`orchestrator`]: pack scans over the extraction worker pool
//! - [`progress`]: host-loop polling of scan events

pub mod classifier;
pub mod file_scanner;
pub mod orchestrator;
pub mod progress;

pub use classifier::{classify, classify_all, Classification, PatternMatch};
pub use file_scanner::{ContainerFile, DiscoveryError, FileScanner};
pub use orchestrator::{Orchestrator, ScanOptions, ScanSummary, Strategy};
pub use progress::{PollOutcome, ScanStatusView, StatusPoller};
