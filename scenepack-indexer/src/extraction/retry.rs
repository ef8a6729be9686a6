//! Transient-error retry for worker runs

use super::ExtractionError;
use scenepack_common::config::ScanConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Extra attempts after a transient failure, with a fixed pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            pause: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            max_retries: config.transient_retries,
            pause: config.retry_pause(),
        }
    }

    /// Run `operation`, retrying only transient errors
    ///
    /// Non-transient errors return immediately. The last transient error is
    /// returned once the retry budget is spent.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, ExtractionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExtractionError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        target_name = label,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Transient extraction error, retrying"
                    );
                    tokio::time::sleep(self.pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionMode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            pause: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = quick()
            .run("Tower", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExtractionError::Timeout {
                        mode: ExtractionMode::SingleGroup,
                        seconds: 300,
                    })
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = quick()
            .run("Tower", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExtractionError::WorkerReported {
                    message: "resource temporarily unavailable".to_string(),
                    traceback: None,
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = quick()
            .run("Tower", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExtractionError::GroupNotFound("Tower".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ExtractionError::GroupNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
