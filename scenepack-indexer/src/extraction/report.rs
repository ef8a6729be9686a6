//! Worker report
//!
//! Raw scene data as the worker saw it. Every field defaults so a sparse
//! quick-scan report and a full geometry dump share one shape.

use super::ExtractionError;
use serde::{Deserialize, Serialize};

/// Row-major 4x4 world transform
pub type Matrix4 = [[f64; 4]; 4];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub groups: Vec<RawGroup>,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

/// A named group as stored in the container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGroup {
    pub name: String,
    /// Names of directly nested groups
    #[serde(default)]
    pub children: Vec<String>,
    /// Names of elements linked directly into this group
    #[serde(default)]
    pub elements: Vec<String>,
    /// Worker saw at least one mesh element directly in this group
    #[serde(default)]
    pub has_mesh: bool,
}

/// One scene element with whatever geometry the worker could read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    pub name: String,
    #[serde(default)]
    pub polygon_count: i64,
    #[serde(default)]
    pub vertex_count: i64,
    #[serde(default)]
    pub material_count: i64,
    /// Groups this element is linked into
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub world_matrix: Option<Matrix4>,
    /// Local-space vertex positions
    #[serde(default)]
    pub vertices: Option<Vec<[f64; 3]>>,
    /// Local-space bounding box corners
    #[serde(default)]
    pub local_corners: Option<Vec<[f64; 3]>>,
    /// Reported object extents before scale
    #[serde(default)]
    pub extents: Option<[f64; 3]>,
    #[serde(default)]
    pub scale: Option<[f64; 3]>,
}

impl WorkerReport {
    /// `Err(WorkerReported)` unless the worker flagged success without an error
    pub fn into_checked(self) -> Result<Self, ExtractionError> {
        if self.success && self.error.is_none() {
            return Ok(self);
        }
        Err(ExtractionError::WorkerReported {
            message: self
                .error
                .unwrap_or_else(|| "worker reported failure without a message".to_string()),
            traceback: self.traceback,
        })
    }

    pub fn group(&self, name: &str) -> Option<&RawGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}
