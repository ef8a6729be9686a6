//! Extraction host
//!
//! [`ExtractionHost`] is the seam between the orchestrator and whatever runs
//! the worker. [`ProcessHost`] runs the headless host application as a child
//! process, one process per extraction.

use super::report::WorkerReport;
use super::request::ExtractionRequest;
use super::ExtractionError;
use async_trait::async_trait;
use scenepack_common::config::{HostConfig, WORKER_ARG};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

/// Characters of stderr kept for diagnostics
const STDERR_TAIL_CHARS: usize = 1000;
/// Characters of stdout kept for diagnostics
const STDOUT_TAIL_CHARS: usize = 500;

/// Bundled extraction worker script
pub const WORKER_SCRIPT: &str = include_str!("../../worker/extract_worker.py");

const WORKER_FILE_NAME: &str = "scenepack_extract_worker.py";

/// Runs one extraction against one container file
#[async_trait]
pub trait ExtractionHost: Send + Sync {
    /// Execute `request` against `container`, returning the raw report
    ///
    /// A report with `success == false` is still `Ok` here; callers use
    /// [`WorkerReport::into_checked`] to turn it into an error.
    async fn extract(
        &self,
        container: &Path,
        request: &ExtractionRequest,
        timeout: Duration,
    ) -> Result<WorkerReport, ExtractionError>;
}

/// Host backed by an external headless application
///
/// Invocation: `<executable> <args...> -- <request.json> <container> <output.json>`
/// with the container's directory as working directory. An argument equal
/// to [`WORKER_ARG`] becomes the worker script path; without a configured
/// script the bundled [`WORKER_SCRIPT`] is installed into the temp dir.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    executable: PathBuf,
    args: Vec<String>,
    worker_script: Option<PathBuf>,
    temp_dir: PathBuf,
    installed_worker: Arc<OnceCell<PathBuf>>,
}

impl ProcessHost {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            worker_script: None,
            temp_dir: std::env::temp_dir(),
            installed_worker: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        let host = Self::new(config.executable.clone(), config.args.clone());
        match &config.worker_script {
            Some(path) => host.with_worker_script(path),
            None => host,
        }
    }

    pub fn with_worker_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_script = Some(path.into());
        self
    }

    /// Directory for request and output files (defaults to the OS temp dir)
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Host arguments with the worker placeholder resolved
    pub async fn resolved_args(&self) -> Result<Vec<OsString>, ExtractionError> {
        if !self.args.iter().any(|a| a == WORKER_ARG) {
            return Ok(self.args.iter().map(OsString::from).collect());
        }

        let worker = self.worker_path().await?;
        Ok(self
            .args
            .iter()
            .map(|a| {
                if a == WORKER_ARG {
                    worker.clone().into_os_string()
                } else {
                    OsString::from(a)
                }
            })
            .collect())
    }

    async fn worker_path(&self) -> Result<PathBuf, ExtractionError> {
        if let Some(path) = &self.worker_script {
            if !tokio::fs::try_exists(path).await? {
                return Err(ExtractionError::Spawn(format!(
                    "worker script {} does not exist",
                    path.display()
                )));
            }
            return Ok(path.clone());
        }

        let path = self
            .installed_worker
            .get_or_try_init(|| install_worker(&self.temp_dir))
            .await?;
        Ok(path.clone())
    }
}

/// Write the bundled worker into `dir` unless an identical copy is there
async fn install_worker(dir: &Path) -> Result<PathBuf, ExtractionError> {
    let path = dir.join(WORKER_FILE_NAME);
    if let Ok(existing) = tokio::fs::read_to_string(&path).await {
        if existing == WORKER_SCRIPT {
            return Ok(path);
        }
    }

    // Rename so a concurrently starting worker never reads a partial script
    let staging = dir.join(format!("{}.{}.tmp", WORKER_FILE_NAME, Uuid::new_v4()));
    tokio::fs::write(&staging, WORKER_SCRIPT).await?;
    tokio::fs::rename(&staging, &path).await?;
    debug!(path = %path.display(), "Installed extraction worker");
    Ok(path)
}

/// Request and output files of one run, removed on drop
struct RunFiles {
    request: PathBuf,
    output: PathBuf,
}

impl RunFiles {
    fn new(dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            request: dir.join(format!("scenepack_request_{}.json", id)),
            output: dir.join(format!("scenepack_output_{}.json", id)),
        }
    }
}

impl Drop for RunFiles {
    fn drop(&mut self) {
        for path in [&self.request, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove worker temp file"),
            }
        }
    }
}

/// Last `max_chars` characters of process output
fn tail(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

#[async_trait]
impl ExtractionHost for ProcessHost {
    async fn extract(
        &self,
        container: &Path,
        request: &ExtractionRequest,
        timeout: Duration,
    ) -> Result<WorkerReport, ExtractionError> {
        let container = tokio::fs::canonicalize(container).await?;
        let working_dir = container
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let files = RunFiles::new(&self.temp_dir);
        let request = request.clone().with_output(&files.output);
        request.validate()?;

        let body = serde_json::to_vec_pretty(&request)
            .map_err(|e| ExtractionError::InvalidRequest(e.to_string()))?;
        tokio::fs::write(&files.request, body).await?;
        let args = self.resolved_args().await?;

        debug!(
            container = %container.display(),
            mode = %request.mode,
            timeout_secs = timeout.as_secs(),
            "Starting extraction worker"
        );

        let child = Command::new(&self.executable)
            .args(&args)
            .arg("--")
            .arg(&files.request)
            .arg(&container)
            .arg(&files.output)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExtractionError::Spawn(format!("{}: {}", self.executable.display(), e))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(container = %container.display(), mode = %request.mode, "Extraction worker timed out");
                return Err(ExtractionError::Timeout {
                    mode: request.mode,
                    seconds: timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(ExtractionError::NonZeroExit {
                code: output.status.code(),
                stderr_tail: tail(&output.stderr, STDERR_TAIL_CHARS),
                stdout_tail: tail(&output.stdout, STDOUT_TAIL_CHARS),
            });
        }

        let raw = match tokio::fs::read(&files.output).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractionError::MissingOutput(files.output.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw).map_err(|e| ExtractionError::MalformedOutput(e.to_string()))
    }
}
