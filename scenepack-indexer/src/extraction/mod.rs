//! Isolated worker extraction
//!
//! Extraction runs inside the headless host application, one process per
//! run, talking to us through JSON files:
//!
//! - [`request`]: what the worker should dump (mode, target group, patterns)
//! - [`report`]: the raw scene data the worker writes back
//! - [`analysis`]: in-process filtering, bounding boxes and group selection
//! - [`host`]: the [`ExtractionHost`] seam and the process-backed host
//! - [`retry`]: transient-error retry policy

pub mod analysis;
pub mod host;
pub mod report;
pub mod request;
pub mod retry;

pub use host::{ExtractionHost, ProcessHost};
pub use report::WorkerReport;
pub use request::{ExtractionMode, ExtractionRequest};
pub use retry::RetryPolicy;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Substrings marking an error worth retrying
pub const TRANSIENT_KEYWORDS: &[&str] = &[
    "timeout",
    "connection",
    "memory",
    "lock",
    "busy",
    "temporary",
    "resource",
    "unavailable",
];

/// Extraction failures
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Host executable could not be started
    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Worker timeout after {seconds}s in {mode} mode")]
    Timeout { mode: ExtractionMode, seconds: u64 },

    #[error("Worker exited with code {code:?}; stderr: {stderr_tail}; stdout: {stdout_tail}")]
    NonZeroExit {
        code: Option<i32>,
        stderr_tail: String,
        stdout_tail: String,
    },

    #[error("Worker produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("Malformed worker output: {0}")]
    MalformedOutput(String),

    /// The worker ran but reported a failure of its own
    #[error("Worker reported failure: {message}")]
    WorkerReported {
        message: String,
        traceback: Option<String>,
    },

    #[error("Group not found in container: {0}")]
    GroupNotFound(String),

    /// Request failed the pre-invocation check
    #[error("Invalid extraction request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Transient errors are worth retrying after a short pause
    ///
    /// Timeouts always are. Worker messages, stderr and I/O errors are
    /// checked against [`TRANSIENT_KEYWORDS`]; group names, paths and stdout
    /// never are.
    pub fn is_transient(&self) -> bool {
        let text = match self {
            ExtractionError::Timeout { .. } => return true,
            ExtractionError::WorkerReported { message, .. } => message.to_lowercase(),
            ExtractionError::NonZeroExit { stderr_tail, .. } => stderr_tail.to_lowercase(),
            ExtractionError::Io(e) => e.to_string().to_lowercase(),
            ExtractionError::Spawn(_)
            | ExtractionError::MissingOutput(_)
            | ExtractionError::MalformedOutput(_)
            | ExtractionError::GroupNotFound(_)
            | ExtractionError::InvalidRequest(_) => return false,
        };
        TRANSIENT_KEYWORDS.iter().any(|k| text.contains(k))
    }
}

/// Run one extraction and reject reports the worker marked as failed
pub async fn run_extraction(
    host: &dyn ExtractionHost,
    container: &Path,
    request: &ExtractionRequest,
    timeout: Duration,
) -> Result<WorkerReport, ExtractionError> {
    let report = host.extract(container, request, timeout).await?;
    report.into_checked()
}
