//! Shared fixtures for integration tests
//!
//! - [`FakeHost`]: in-process extraction host answering from scripted scenes
//! - [`RecordingAccess`]: container access that records every call
//! - scene and store builders

#![allow(dead_code)]

use async_trait::async_trait;
use scenepack_common::db::{init_database, NewAsset, QualityTier, ResourceKind, SizeCategory};
use scenepack_indexer::extraction::report::{Matrix4, RawElement, RawGroup};
use scenepack_indexer::extraction::{ExtractionError, ExtractionHost, ExtractionMode, ExtractionRequest, WorkerReport};
use scenepack_indexer::loader::{
    AccessError, BatchRequest, ContainerAccess, ContainerListing, LoadedBatch, PlacementTag, Transform,
};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Store file inside a fresh temp dir
pub async fn temp_store() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("scenepack.db")).await.unwrap();
    (dir, pool)
}

/// Create a container file of `size_bytes` (sparse)
pub fn container_file(dir: &Path, relative: &str, size_bytes: u64) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(size_bytes).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

fn translation(at: [f64; 3]) -> Matrix4 {
    [
        [1.0, 0.0, 0.0, at[0]],
        [0.0, 1.0, 0.0, at[1]],
        [0.0, 0.0, 1.0, at[2]],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Box-shaped element centered at `at`
pub fn element(name: &str, polygons: i64, size: [f64; 3], at: [f64; 3], groups: &[&str]) -> RawElement {
    let half = [size[0] / 2.0, size[1] / 2.0, size[2] / 2.0];
    RawElement {
        name: name.to_string(),
        polygon_count: polygons,
        vertex_count: polygons + 2,
        material_count: 1,
        groups: groups.iter().map(|g| g.to_string()).collect(),
        world_matrix: Some(translation(at)),
        vertices: Some(vec![[-half[0], -half[1], -half[2]], half]),
        ..Default::default()
    }
}

pub fn group(name: &str, children: &[&str], elements: &[&str]) -> RawGroup {
    RawGroup {
        name: name.to_string(),
        children: children.iter().map(|c| c.to_string()).collect(),
        elements: elements.iter().map(|e| e.to_string()).collect(),
        has_mesh: !elements.is_empty(),
    }
}

/// Two top-level groups and one ungrouped prop
///
/// `Building_A`: 5000 polygons, 4 x 4 x 8. `Car_01`: 1200 polygons,
/// 1.98 x 1 x 1.5. `Prop_Barrel`: 80 polygons.
pub fn city_scene() -> WorkerReport {
    WorkerReport {
        success: true,
        groups: vec![
            group("Building_A", &[], &["Building_A_Walls", "Building_A_Roof"]),
            group("Car_01", &[], &["Car_Body"]),
        ],
        elements: vec![
            element("Building_A_Walls", 3000, [4.0, 4.0, 6.0], [0.0, 0.0, 3.0], &["Building_A"]),
            element("Building_A_Roof", 2000, [4.0, 4.0, 2.0], [0.0, 0.0, 7.0], &["Building_A"]),
            element("Car_Body", 1200, [1.98, 1.0, 1.5], [10.0, 0.0, 0.75], &["Car_01"]),
            element("Prop_Barrel", 80, [0.6, 0.6, 0.9], [-5.0, 0.0, 0.45], &[]),
        ],
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Fake extraction host
// ---------------------------------------------------------------------------

/// One recorded extraction call
#[derive(Debug, Clone, PartialEq)]
pub struct HostCall {
    pub file_name: String,
    pub mode: ExtractionMode,
    pub target_group: Option<String>,
}

struct ScriptedFailure {
    file_name: String,
    mode: ExtractionMode,
    target_group: Option<String>,
    message: String,
    remaining: usize,
}

/// Extraction host answering from a per-file scene
///
/// Quick scans get the group outline only; other modes get the whole scene
/// and rely on analysis for filtering, like the real worker output. Files
/// with no scene fail with a non-zero exit.
#[derive(Default)]
pub struct FakeHost {
    scenes: Mutex<HashMap<String, WorkerReport>>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    calls: Mutex<Vec<HostCall>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scene served for containers named `file_name`
    pub fn with_scene(self, file_name: &str, scene: WorkerReport) -> Self {
        self.scenes.lock().unwrap().insert(file_name.to_string(), scene);
        self
    }

    /// Fail the next `times` matching calls with a worker-reported `message`
    pub fn fail(self, file_name: &str, mode: ExtractionMode, target_group: Option<&str>, message: &str, times: usize) -> Self {
        self.failures.lock().unwrap().push_back(ScriptedFailure {
            file_name: file_name.to_string(),
            mode,
            target_group: target_group.map(str::to_string),
            message: message.to_string(),
            remaining: times,
        });
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with_mode(&self, mode: ExtractionMode) -> Vec<HostCall> {
        self.calls().into_iter().filter(|c| c.mode == mode).collect()
    }

    fn take_failure(&self, call: &HostCall) -> Option<String> {
        let mut failures = self.failures.lock().unwrap();
        let failure = failures.iter_mut().find(|f| {
            f.remaining > 0
                && f.file_name == call.file_name
                && f.mode == call.mode
                && f.target_group == call.target_group
        })?;
        failure.remaining -= 1;
        Some(failure.message.clone())
    }
}

#[async_trait]
impl ExtractionHost for FakeHost {
    async fn extract(
        &self,
        container: &Path,
        request: &ExtractionRequest,
        _timeout: Duration,
    ) -> Result<WorkerReport, ExtractionError> {
        request.clone().with_output(Path::new("fake-output.json")).validate()?;

        let call = HostCall {
            file_name: container
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mode: request.mode,
            target_group: request.target_group.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());

        if let Some(message) = self.take_failure(&call) {
            return Ok(WorkerReport {
                success: false,
                error: Some(message),
                ..Default::default()
            });
        }

        let scene = self.scenes.lock().unwrap().get(&call.file_name).cloned();
        let Some(scene) = scene else {
            return Err(ExtractionError::NonZeroExit {
                code: Some(1),
                stderr_tail: format!("cannot read {}", call.file_name),
                stdout_tail: String::new(),
            });
        };

        match request.mode {
            ExtractionMode::QuickScan => Ok(WorkerReport {
                success: true,
                groups: scene.groups.clone(),
                ..Default::default()
            }),
            ExtractionMode::SingleGroup => {
                let target = request.target_group.clone().unwrap_or_default();
                if scene.group(&target).is_none() {
                    return Ok(WorkerReport {
                        success: false,
                        error: Some(format!("Group '{}' not found", target)),
                        ..Default::default()
                    });
                }
                Ok(scene)
            }
            ExtractionMode::FullFile | ExtractionMode::Standalone => Ok(scene),
        }
    }
}

// ---------------------------------------------------------------------------
// Recording container access
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PlacedKind {
    Group(String),
    Object(String),
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct Placed {
    pub kind: PlacedKind,
    pub transform: Transform,
    pub tag: PlacementTag,
}

/// Container access backed by in-memory listings; records every call
#[derive(Default)]
pub struct RecordingAccess {
    listings: HashMap<PathBuf, ContainerListing>,
    /// Names a batch load silently fails to bring in
    unloadable: Vec<String>,
    pub cleared: usize,
    pub opened: Vec<PathBuf>,
    pub batches: Vec<(PathBuf, BatchRequest)>,
    pub placed: Vec<Placed>,
}

impl RecordingAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(mut self, path: &Path, groups: &[&str], objects: &[&str]) -> Self {
        self.listings.insert(
            path.to_path_buf(),
            ContainerListing {
                groups: groups.iter().map(|g| g.to_string()).collect(),
                objects: objects.iter().map(|o| o.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_unloadable(mut self, name: &str) -> Self {
        self.unloadable.push(name.to_string());
        self
    }

    pub fn placeholders(&self) -> Vec<&Placed> {
        self.placed.iter().filter(|p| p.kind == PlacedKind::Placeholder).collect()
    }
}

impl ContainerAccess for RecordingAccess {
    fn clear_generated(&mut self) -> Result<usize, AccessError> {
        let removed = self.placed.len();
        self.placed.clear();
        self.cleared += 1;
        Ok(removed)
    }

    fn open(&mut self, container: &Path) -> Result<ContainerListing, AccessError> {
        self.opened.push(container.to_path_buf());
        self.listings.get(container).cloned().ok_or_else(|| AccessError::Open {
            path: container.display().to_string(),
            message: "not a container".to_string(),
        })
    }

    fn load_batch(&mut self, container: &Path, request: &BatchRequest) -> Result<LoadedBatch, AccessError> {
        self.batches.push((container.to_path_buf(), request.clone()));
        let loadable = |name: &&String| !self.unloadable.contains(*name);
        Ok(LoadedBatch {
            groups: request.groups.iter().filter(loadable).cloned().collect(),
            objects: request.objects.iter().filter(loadable).cloned().collect(),
        })
    }

    fn instance_group(&mut self, group: &str, transform: &Transform, tag: &PlacementTag) -> Result<(), AccessError> {
        self.placed.push(Placed {
            kind: PlacedKind::Group(group.to_string()),
            transform: *transform,
            tag: tag.clone(),
        });
        Ok(())
    }

    fn place_object(&mut self, object: &str, transform: &Transform, tag: &PlacementTag) -> Result<(), AccessError> {
        self.placed.push(Placed {
            kind: PlacedKind::Object(object.to_string()),
            transform: *transform,
            tag: tag.clone(),
        });
        Ok(())
    }

    fn place_placeholder(&mut self, transform: &Transform, tag: &PlacementTag) -> Result<(), AccessError> {
        self.placed.push(Placed {
            kind: PlacedKind::Placeholder,
            transform: *transform,
            tag: tag.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store records
// ---------------------------------------------------------------------------

pub fn new_asset(pack_id: i64, name: &str, container: &Path, kind: ResourceKind) -> NewAsset {
    NewAsset {
        name: name.to_string(),
        pack_id,
        category: "props".to_string(),
        subcategory: None,
        file_path: container
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        container_path: container.to_string_lossy().into_owned(),
        resource_kind: kind,
        resource_name: name.to_string(),
        polygon_count: 500,
        vertex_count: 600,
        material_count: 1,
        object_count: 1,
        dimensions: [1.0, 1.0, 1.0],
        complexity_score: 5.0,
        quality_tier: QualityTier::Medium,
        estimated_load_time: 0.1,
        memory_estimate: 1.0,
        primary_style: None,
        size_category: SizeCategory::Medium,
    }
}
