//! Worker request
//!
//! Written as JSON next to the run and handed to the worker on its command
//! line. Carries everything the worker needs; nothing is generated as code.

use super::ExtractionError;
use scenepack_common::config::TimeoutConfig;
use scenepack_common::db::PatternSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest bounding extent (meters) for an element to count as visual
pub const DEFAULT_MIN_ELEMENT_EXTENT: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Group hierarchy and mesh flags only, no geometry
    QuickScan,
    /// Geometry of one named group and its descendants
    SingleGroup,
    /// Geometry of the whole file
    FullFile,
    /// Geometry of elements outside the listed groups
    Standalone,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::QuickScan => "quick_scan",
            ExtractionMode::SingleGroup => "single_group",
            ExtractionMode::FullFile => "full_file",
            ExtractionMode::Standalone => "standalone",
        }
    }

    pub fn timeout(&self, timeouts: &TimeoutConfig) -> Duration {
        let secs = match self {
            ExtractionMode::QuickScan => timeouts.quick_scan_secs,
            ExtractionMode::SingleGroup => timeouts.single_group_secs,
            ExtractionMode::FullFile => timeouts.full_file_secs,
            ExtractionMode::Standalone => timeouts.standalone_secs,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub mode: ExtractionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group: Option<String>,
    #[serde(default)]
    pub excluded_groups: Vec<String>,
    pub patterns: PatternSnapshot,
    pub min_element_extent: f64,
    /// Where the worker writes its report; set by the host before the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl ExtractionRequest {
    fn new(mode: ExtractionMode, patterns: PatternSnapshot) -> Self {
        Self {
            mode,
            target_group: None,
            excluded_groups: Vec::new(),
            patterns,
            min_element_extent: DEFAULT_MIN_ELEMENT_EXTENT,
            output_path: None,
        }
    }

    pub fn quick_scan(patterns: PatternSnapshot) -> Self {
        Self::new(ExtractionMode::QuickScan, patterns)
    }

    pub fn full_file(patterns: PatternSnapshot) -> Self {
        Self::new(ExtractionMode::FullFile, patterns)
    }

    pub fn single_group(group: &str, patterns: PatternSnapshot) -> Self {
        let mut request = Self::new(ExtractionMode::SingleGroup, patterns);
        request.target_group = Some(group.to_string());
        request
    }

    pub fn standalone(excluded_groups: &[String], patterns: PatternSnapshot) -> Self {
        let mut request = Self::new(ExtractionMode::Standalone, patterns);
        request.excluded_groups = excluded_groups.to_vec();
        request
    }

    pub fn with_output(mut self, path: &Path) -> Self {
        self.output_path = Some(path.to_path_buf());
        self
    }

    /// Pre-invocation check of the request the worker is about to receive
    pub fn validate(&self) -> Result<(), ExtractionError> {
        let invalid = |msg: String| Err(ExtractionError::InvalidRequest(msg));

        match &self.output_path {
            None => return invalid("output path not set".to_string()),
            Some(p) if p.as_os_str().is_empty() => return invalid("output path is empty".to_string()),
            Some(_) => {}
        }

        if !self.min_element_extent.is_finite() || self.min_element_extent < 0.0 {
            return invalid(format!("bad min_element_extent {}", self.min_element_extent));
        }

        match self.mode {
            ExtractionMode::SingleGroup => match self.target_group.as_deref() {
                None => return invalid("single_group mode needs a target group".to_string()),
                Some(name) if name.trim().is_empty() => {
                    return invalid("target group name is empty".to_string())
                }
                Some(_) => {}
            },
            ExtractionMode::Standalone => {
                if self.excluded_groups.is_empty() {
                    return invalid("standalone mode needs the extracted group list".to_string());
                }
            }
            ExtractionMode::QuickScan | ExtractionMode::FullFile => {
                if self.target_group.is_some() {
                    return invalid(format!("{} mode takes no target group", self.mode));
                }
            }
        }

        if self.excluded_groups.iter().any(|g| g.trim().is_empty()) {
            return invalid("excluded group name is empty".to_string());
        }

        Ok(())
    }
}
