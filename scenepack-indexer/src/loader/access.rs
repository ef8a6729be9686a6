//! Container-file access capability
//!
//! The host application's scene API, reduced to what scene assembly needs.
//! Implementations run on the host's own thread; nothing here is `Send`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Cannot open container {path}: {message}")]
    Open { path: String, message: String },

    #[error("Batch load from {path} failed: {message}")]
    Load { path: String, message: String },

    #[error("Placement of {name} failed: {message}")]
    Place { name: String, message: String },

    #[error("Host error: {0}")]
    Host(String),
}

/// Target placement in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: [f64; 3],
    /// Euler rotation in radians
    pub rotation: [f64; 3],
    /// Uniform scale
    pub scale: f64,
}

/// Identity of the asset a placement stands for
///
/// Stored on every generated placement so placeholders can be found and
/// replaced later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementTag {
    pub asset_id: i64,
    pub asset_name: String,
    pub container_path: String,
    pub resource_name: String,
}

/// Named resources available in an opened container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerListing {
    pub groups: Vec<String>,
    pub objects: Vec<String>,
}

/// Resources requested from one container in a single load call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    pub groups: Vec<String>,
    pub objects: Vec<String>,
}

impl BatchRequest {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.objects.is_empty()
    }

    /// Add a group name once
    pub fn add_group(&mut self, name: &str) {
        if !self.groups.iter().any(|g| g == name) {
            self.groups.push(name.to_string());
        }
    }

    /// Add an object name once
    pub fn add_object(&mut self, name: &str) {
        if !self.objects.iter().any(|o| o == name) {
            self.objects.push(name.to_string());
        }
    }
}

/// Names a batch load actually brought in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedBatch {
    pub groups: BTreeSet<String>,
    pub objects: BTreeSet<String>,
}

/// Host scene operations used by the loader
pub trait ContainerAccess {
    /// Remove placements generated by earlier builds; returns how many
    fn clear_generated(&mut self) -> Result<usize, AccessError>;

    /// Open a container and list its named groups and objects
    fn open(&mut self, container: &Path) -> Result<ContainerListing, AccessError>;

    /// Load every requested resource from an opened container in one call
    fn load_batch(&mut self, container: &Path, request: &BatchRequest) -> Result<LoadedBatch, AccessError>;

    /// Place an instance of a loaded group (an instancing handle, not a copy)
    fn instance_group(&mut self, group: &str, transform: &Transform, tag: &PlacementTag) -> Result<(), AccessError>;

    /// Place a new object sharing a loaded object's geometry
    fn place_object(&mut self, object: &str, transform: &Transform, tag: &PlacementTag) -> Result<(), AccessError>;

    /// Place a primitive stand-in for an asset that could not be loaded
    fn place_placeholder(&mut self, transform: &Transform, tag: &PlacementTag) -> Result<(), AccessError>;
}
