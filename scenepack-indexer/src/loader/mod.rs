//! Scene assembly
//!
//! Turns `(asset, location, rotation)` triples into placements in the host
//! scene. Work is grouped per container file: each file is opened once and
//! all of its needed resources come in through one batch load. Any entry
//! that cannot be resolved or loaded gets a tagged placeholder instead, so a
//! build always completes.

pub mod access;
pub mod resolve;

pub use access::{
    AccessError, BatchRequest, ContainerAccess, ContainerListing, LoadedBatch, PlacementTag,
    Transform,
};
pub use resolve::{match_resource_name, MatchKind};

use crate::db::assets;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scenepack_common::db::{AssetRecord, ResourceKind};
use scenepack_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Category placed without scale jitter
pub const UNJITTERED_CATEGORY: &str = "architecture";

/// Scale jitter range
const JITTER_MIN: f64 = 0.95;
const JITTER_MAX: f64 = 1.05;

/// Per-entry assembly failures; none of them abort a build
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Invalid entry: {0}")]
    Validation(String),

    #[error("Resource not resolved: {0}")]
    ResourceResolution(String),

    #[error(transparent)]
    Access(#[from] AccessError),
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Seed for scale jitter; `None` seeds from entropy
    pub seed: Option<u64>,
}

/// One generated placement
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub tag: PlacementTag,
    pub resource_kind: ResourceKind,
    /// Resource actually used; `None` for placeholders
    pub resolved_name: Option<String>,
    pub transform: Transform,
    pub placeholder: bool,
    /// Why a placeholder was used
    pub reason: Option<String>,
}

/// Entry left out of the build
#[derive(Debug, Clone, Serialize)]
pub struct DroppedEntry {
    pub index: usize,
    pub asset_name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneBuildReport {
    pub placements: Vec<Placement>,
    pub placeholders: usize,
    pub dropped: Vec<DroppedEntry>,
    pub containers_opened: usize,
    pub batch_loads: usize,
    pub reasoning: String,
}

/// Validated entry waiting for placement
struct Entry<'a> {
    index: usize,
    asset: &'a AssetRecord,
    location: [f64; 3],
    rotation: [f64; 3],
}

/// Where a validated entry's resource was found
enum Resolution {
    Group(String),
    Object(String),
    Failed(AssemblyError),
}

/// Build a scene from stored asset records
///
/// Lists are truncated to the shorter of `assets` and `locations`. A
/// missing or malformed rotation becomes `[0, 0, 0]`.
pub fn build_scene<A: ContainerAccess + ?Sized>(
    access: &mut A,
    assets: &[AssetRecord],
    locations: &[Vec<f64>],
    rotations: &[Vec<f64>],
    options: &BuildOptions,
) -> SceneBuildReport {
    let requested: Vec<Option<&AssetRecord>> = assets.iter().map(Some).collect();
    assemble(access, &requested, locations, rotations, options)
}

/// Look the ids up in the store, then [`build_scene`]
///
/// Ids with no stored record are dropped like any other invalid entry.
pub async fn build_scene_from_ids<A: ContainerAccess + ?Sized>(
    pool: &SqlitePool,
    ids: &[i64],
    locations: &[Vec<f64>],
    rotations: &[Vec<f64>],
    access: &mut A,
    options: &BuildOptions,
) -> Result<SceneBuildReport> {
    let records = assets::get_assets_by_ids(pool, ids).await?;
    let by_id: HashMap<i64, &AssetRecord> = records.iter().map(|r| (r.id, r)).collect();
    let requested: Vec<Option<&AssetRecord>> = ids.iter().map(|id| by_id.get(id).copied()).collect();

    Ok(assemble(access, &requested, locations, rotations, options))
}

fn assemble<A: ContainerAccess + ?Sized>(
    access: &mut A,
    requested: &[Option<&AssetRecord>],
    locations: &[Vec<f64>],
    rotations: &[Vec<f64>],
    options: &BuildOptions,
) -> SceneBuildReport {
    let mut report = SceneBuildReport::default();
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match access.clear_generated() {
        Ok(removed) => debug!(removed, "Cleared previously generated placements"),
        Err(e) => warn!(error = %e, "Failed to clear generated placements"),
    }

    let count = requested.len().min(locations.len());
    if requested.len() != locations.len() {
        warn!(assets = requested.len(), locations = locations.len(), "Entry lists differ in length, truncating");
    }

    // Step 1: validate; Step 2: group by container, keeping request order
    let mut by_container: BTreeMap<&str, Vec<Entry>> = BTreeMap::new();
    for index in 0..count {
        match validate_entry(index, requested[index], &locations[index], rotations.get(index)) {
            Ok(entry) => {
                let asset = entry.asset;
                by_container
                    .entry(asset.container_path.as_str())
                    .or_default()
                    .push(entry);
            }
            Err(e) => {
                warn!(index, error = %e, "Dropping scene entry");
                report.dropped.push(DroppedEntry {
                    index,
                    asset_name: requested[index].map(|a| a.name.clone()),
                    reason: e.to_string(),
                });
            }
        }
    }

    for (container, entries) in &by_container {
        load_container(access, Path::new(container), entries, &mut rng, &mut report);
    }

    report.placeholders = report.placements.iter().filter(|p| p.placeholder).count();
    let placed = report.placements.len() - report.placeholders;
    report.reasoning = format!(
        "Placed {} of {} requested assets from {} container file(s); {} placeholder(s), {} dropped",
        placed,
        requested.len(),
        report.containers_opened,
        report.placeholders,
        report.dropped.len()
    );
    info!(
        placed,
        placeholders = report.placeholders,
        dropped = report.dropped.len(),
        containers = report.containers_opened,
        "Scene build complete"
    );
    report
}

fn validate_entry<'a>(
    index: usize,
    asset: Option<&'a AssetRecord>,
    location: &[f64],
    rotation: Option<&Vec<f64>>,
) -> std::result::Result<Entry<'a>, AssemblyError> {
    let asset = asset.ok_or_else(|| AssemblyError::Validation("unknown asset".to_string()))?;
    let location = to_vec3(location).ok_or_else(|| {
        AssemblyError::Validation(format!("location must be 3 finite numbers, got {:?}", location))
    })?;

    if asset.name.trim().is_empty() || asset.resource_name.trim().is_empty() {
        return Err(AssemblyError::Validation(format!("asset {} has no resource name", asset.id)));
    }
    if asset.container_path.trim().is_empty() {
        return Err(AssemblyError::Validation(format!("asset {} has no container path", asset.name)));
    }
    if !Path::new(&asset.container_path).is_file() {
        return Err(AssemblyError::Validation(format!(
            "container file missing: {}",
            asset.container_path
        )));
    }

    Ok(Entry {
        index,
        asset,
        location,
        rotation: rotation.and_then(|r| to_vec3(r)).unwrap_or([0.0; 3]),
    })
}

fn to_vec3(values: &[f64]) -> Option<[f64; 3]> {
    match values {
        [x, y, z] if values.iter().all(|v| v.is_finite()) => Some([*x, *y, *z]),
        _ => None,
    }
}

/// Scale jitter for one placement
pub fn jitter_scale<R: Rng>(category: &str, rng: &mut R) -> f64 {
    if category == UNJITTERED_CATEGORY {
        1.0
    } else {
        rng.gen_range(JITTER_MIN..=JITTER_MAX)
    }
}

fn resolve(asset: &AssetRecord, listing: &ContainerListing) -> Resolution {
    match asset.resource_kind {
        ResourceKind::Collection => {
            if listing.groups.iter().any(|g| g == &asset.resource_name) {
                Resolution::Group(asset.resource_name.clone())
            } else {
                Resolution::Failed(AssemblyError::ResourceResolution(format!(
                    "group {} not in container",
                    asset.resource_name
                )))
            }
        }
        ResourceKind::Object => match match_resource_name(&asset.resource_name, &listing.objects) {
            Some((name, kind)) => {
                if kind != MatchKind::Exact {
                    debug!(asset = %asset.resource_name, resolved = name, ?kind, "Resolved object by fuzzy match");
                }
                Resolution::Object(name.to_string())
            }
            None => Resolution::Failed(AssemblyError::ResourceResolution(format!(
                "object {} not in container",
                asset.resource_name
            ))),
        },
    }
}

fn tag_for(asset: &AssetRecord) -> PlacementTag {
    PlacementTag {
        asset_id: asset.id,
        asset_name: asset.name.clone(),
        container_path: asset.container_path.clone(),
        resource_name: asset.resource_name.clone(),
    }
}

/// Steps 3 to 5 for one container file
fn load_container<A: ContainerAccess + ?Sized>(
    access: &mut A,
    container: &Path,
    entries: &[Entry],
    rng: &mut StdRng,
    report: &mut SceneBuildReport,
) {
    let listing = match access.open(container) {
        Ok(listing) => {
            report.containers_opened += 1;
            listing
        }
        Err(e) => {
            warn!(file = %container.display(), error = %e, "Cannot open container, using placeholders");
            let reason = e.to_string();
            for entry in entries {
                place_fallback(access, entry, &reason, report);
            }
            return;
        }
    };

    let resolutions: Vec<Resolution> = entries.iter().map(|e| resolve(e.asset, &listing)).collect();

    let mut batch = BatchRequest::default();
    for resolution in &resolutions {
        match resolution {
            Resolution::Group(name) => batch.add_group(name),
            Resolution::Object(name) => batch.add_object(name),
            Resolution::Failed(_) => {}
        }
    }

    let loaded = if batch.is_empty() {
        Ok(LoadedBatch::default())
    } else {
        report.batch_loads += 1;
        debug!(
            file = %container.display(),
            groups = batch.groups.len(),
            objects = batch.objects.len(),
            "Batch loading resources"
        );
        access.load_batch(container, &batch)
    };

    let loaded = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            warn!(file = %container.display(), error = %e, "Batch load failed, using placeholders");
            let reason = e.to_string();
            for entry in entries {
                place_fallback(access, entry, &reason, report);
            }
            return;
        }
    };

    for (entry, resolution) in entries.iter().zip(resolutions) {
        let tag = tag_for(entry.asset);
        let transform = Transform {
            location: entry.location,
            rotation: entry.rotation,
            scale: jitter_scale(&entry.asset.category, rng),
        };

        let placed = match &resolution {
            Resolution::Group(name) if loaded.groups.contains(name) => access
                .instance_group(name, &transform, &tag)
                .map_err(|e| AssemblyError::from(e).to_string()),
            Resolution::Object(name) if loaded.objects.contains(name) => access
                .place_object(name, &transform, &tag)
                .map_err(|e| AssemblyError::from(e).to_string()),
            Resolution::Group(name) | Resolution::Object(name) => Err(
                AssemblyError::ResourceResolution(format!("{} missing from batch load", name)).to_string(),
            ),
            Resolution::Failed(e) => Err(e.to_string()),
        };

        match placed {
            Ok(()) => report.placements.push(Placement {
                tag,
                resource_kind: entry.asset.resource_kind,
                resolved_name: match resolution {
                    Resolution::Group(name) | Resolution::Object(name) => Some(name),
                    Resolution::Failed(_) => None,
                },
                transform,
                placeholder: false,
                reason: None,
            }),
            Err(reason) => {
                debug!(asset = %entry.asset.name, error = %reason, "Falling back to placeholder");
                place_fallback(access, entry, &reason, report);
            }
        }
    }
}

fn place_fallback<A: ContainerAccess + ?Sized>(
    access: &mut A,
    entry: &Entry,
    reason: &str,
    report: &mut SceneBuildReport,
) {
    let tag = tag_for(entry.asset);
    let transform = Transform {
        location: entry.location,
        rotation: entry.rotation,
        scale: 1.0,
    };

    match access.place_placeholder(&transform, &tag) {
        Ok(()) => report.placements.push(Placement {
            tag,
            resource_kind: entry.asset.resource_kind,
            resolved_name: None,
            transform,
            placeholder: true,
            reason: Some(reason.to_string()),
        }),
        Err(e) => {
            warn!(asset = %entry.asset.name, error = %e, "Placeholder placement failed");
            report.dropped.push(DroppedEntry {
                index: entry.index,
                asset_name: Some(entry.asset.name.clone()),
                reason: format!("{}; placeholder failed: {}", reason, e),
            });
        }
    }
}
