//! Worker report analysis
//!
//! Turns raw worker output into asset candidates. Applied identically to
//! every mode so the worker itself stays a plain data dump.

use super::report::{Matrix4, RawElement, RawGroup, WorkerReport};
use super::ExtractionError;
use scenepack_common::db::ResourceKind;
use std::collections::{HashMap, HashSet};

/// Minimum largest-axis extent (meters) for a group or standalone element
/// to become an asset
pub const MIN_ASSET_EXTENT: f64 = 0.001;

const RIG_PREFIXES: &[&str] = &["cs_", "ctrl", "ik_", "bone", "meta", "wgt_"];

const RIG_SUBSTRINGS: &[&str] = &[
    "control",
    "constraint",
    "driver",
    "target",
    "pole",
    "helper",
    "locator",
];

const SYSTEM_GROUP_KEYWORDS: &[&str] = &[
    "rig",
    "control",
    "bone",
    "constraint",
    "driver",
    "meta",
    "temp",
    "hidden",
    "backup",
    "deleted",
];

const SYSTEM_GROUP_NAMES: &[&str] = &["collection", "scene collection"];

/// Axis-aligned world-space bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    fn from_points<I: IntoIterator<Item = [f64; 3]>>(points: I) -> Option<Self> {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        let mut any = false;

        for p in points {
            if !p.iter().all(|v| v.is_finite()) {
                continue;
            }
            any = true;
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        any.then_some(Self { min, max })
    }

    pub fn dimensions(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn max_extent(&self) -> f64 {
        let [w, h, d] = self.dimensions();
        w.max(h).max(d)
    }

    fn union(&self, other: &Bounds) -> Bounds {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }
}

/// Asset candidate produced by analysis
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAsset {
    pub name: String,
    pub kind: ResourceKind,
    pub polygon_count: i64,
    pub vertex_count: i64,
    pub material_count: i64,
    pub object_count: i64,
    pub bounds: Bounds,
}

impl ExtractedAsset {
    pub fn dimensions(&self) -> [f64; 3] {
        self.bounds.dimensions()
    }
}

fn transform(m: &Matrix4, p: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (row, value) in out.iter_mut().enumerate() {
        *value = m[row][0] * p[0] + m[row][1] * p[1] + m[row][2] * p[2] + m[row][3];
    }
    out
}

const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// World-space bounds of one element
///
/// Tries transformed vertices, then transformed local bounding corners, then
/// reported extents times scale centered on the element origin.
pub fn element_bounds(element: &RawElement) -> Option<Bounds> {
    let matrix = element.world_matrix.unwrap_or(IDENTITY);

    if let Some(vertices) = element.vertices.as_deref().filter(|v| !v.is_empty()) {
        if let Some(bounds) = Bounds::from_points(vertices.iter().map(|v| transform(&matrix, *v))) {
            return Some(bounds);
        }
    }

    if let Some(corners) = element.local_corners.as_deref().filter(|c| !c.is_empty()) {
        if let Some(bounds) = Bounds::from_points(corners.iter().map(|c| transform(&matrix, *c))) {
            return Some(bounds);
        }
    }

    let extents = element.extents?;
    let scale = element.scale.unwrap_or([1.0; 3]);
    let center = [matrix[0][3], matrix[1][3], matrix[2][3]];
    let mut min = [0.0; 3];
    let mut max = [0.0; 3];
    for axis in 0..3 {
        let half = (extents[axis] * scale[axis]).abs() / 2.0;
        min[axis] = center[axis] - half;
        max[axis] = center[axis] + half;
    }
    Bounds::from_points([min, max])
}

/// Rig and control elements are never assets
pub fn is_rig_name(name: &str) -> bool {
    if name.trim().is_empty() {
        return true;
    }
    let lower = name.to_lowercase();
    RIG_PREFIXES.iter().any(|p| lower.starts_with(p)) || RIG_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

/// System or utility group, matched on whole name tokens
///
/// `Character_Rig` and `Old Backups` are skipped; `Bridge` and `Temple` are not.
pub fn is_system_group(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    if lower.is_empty() || SYSTEM_GROUP_NAMES.contains(&lower.as_str()) {
        return true;
    }
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| {
            SYSTEM_GROUP_KEYWORDS
                .iter()
                .any(|k| token == *k || token.strip_suffix('s') == Some(*k))
        })
}

/// Element with polygons whose bounds exceed `min_extent`
pub fn is_visual(element: &RawElement, min_extent: f64) -> bool {
    element.polygon_count > 0
        && element_bounds(element)
            .map(|b| b.max_extent() > min_extent)
            .unwrap_or(false)
}

/// Lookup tables over one report
struct ReportIndex<'a> {
    groups: HashMap<&'a str, &'a RawGroup>,
    elements: HashMap<&'a str, &'a RawElement>,
    nested: HashSet<&'a str>,
}

impl<'a> ReportIndex<'a> {
    fn new(report: &'a WorkerReport) -> Self {
        let groups = report.groups.iter().map(|g| (g.name.as_str(), g)).collect();
        let elements = report.elements.iter().map(|e| (e.name.as_str(), e)).collect();
        let nested = report
            .groups
            .iter()
            .flat_map(|g| g.children.iter().filter(move |c| **c != g.name).map(String::as_str))
            .collect();
        Self {
            groups,
            elements,
            nested,
        }
    }

    /// Elements linked to a group or any descendant, deduplicated, in
    /// depth-first order
    fn group_elements(&self, group: &'a RawGroup) -> Vec<&'a RawElement> {
        let mut seen_groups = HashSet::new();
        let mut seen_elements = HashSet::new();
        let mut out = Vec::new();
        self.collect(group, &mut seen_groups, &mut seen_elements, &mut out);
        out
    }

    fn collect(
        &self,
        group: &'a RawGroup,
        seen_groups: &mut HashSet<&'a str>,
        seen_elements: &mut HashSet<&'a str>,
        out: &mut Vec<&'a RawElement>,
    ) {
        if !seen_groups.insert(group.name.as_str()) {
            return;
        }
        for name in &group.elements {
            if let Some(element) = self.elements.get(name.as_str()) {
                if seen_elements.insert(name.as_str()) {
                    out.push(*element);
                }
            }
        }
        for child in &group.children {
            if let Some(child) = self.groups.get(child.as_str()) {
                self.collect(*child, seen_groups, seen_elements, out);
            }
        }
    }

    fn has_mesh(&self, group: &'a RawGroup) -> bool {
        if group.has_mesh || self.group_elements(group).iter().any(|e| e.polygon_count > 0) {
            return true;
        }
        let mut seen = HashSet::new();
        self.child_has_mesh(group, &mut seen)
    }

    fn child_has_mesh(&self, group: &'a RawGroup, seen: &mut HashSet<&'a str>) -> bool {
        if !seen.insert(group.name.as_str()) {
            return false;
        }
        group.children.iter().any(|c| {
            self.groups
                .get(c.as_str())
                .map(|child| child.has_mesh || self.child_has_mesh(*child, seen))
                .unwrap_or(false)
        })
    }

    fn top_level(&self, report: &'a WorkerReport) -> Vec<&'a RawGroup> {
        report
            .groups
            .iter()
            .filter(|g| !self.nested.contains(g.name.as_str()))
            .filter(|g| !is_system_group(&g.name))
            .collect()
    }

    fn aggregate(&self, group: &'a RawGroup, min_extent: f64) -> (Option<ExtractedAsset>, Vec<&'a str>) {
        let visual: Vec<&RawElement> = self
            .group_elements(group)
            .into_iter()
            .filter(|e| is_visual(e, min_extent))
            .collect();
        if visual.is_empty() {
            return (None, Vec::new());
        }

        let mut bounds: Option<Bounds> = None;
        for element in &visual {
            let Some(b) = element_bounds(element) else { continue };
            // Degenerate elements add geometry counts but not extent
            if b.max_extent() <= min_extent {
                continue;
            }
            bounds = Some(match bounds {
                Some(acc) => acc.union(&b),
                None => b,
            });
        }

        let names = visual.iter().map(|e| e.name.as_str()).collect();
        let polygon_count: i64 = visual.iter().map(|e| e.polygon_count.max(0)).sum();

        let asset = bounds
            .filter(|b| polygon_count > 0 && b.max_extent() > MIN_ASSET_EXTENT)
            .map(|bounds| ExtractedAsset {
                name: group.name.clone(),
                kind: ResourceKind::Collection,
                polygon_count,
                vertex_count: visual.iter().map(|e| e.vertex_count.max(0)).sum(),
                material_count: visual.iter().map(|e| e.material_count.max(0)).max().unwrap_or(0),
                object_count: visual.len() as i64,
                bounds,
            });
        (asset, names)
    }

    fn standalone(
        &self,
        report: &'a WorkerReport,
        excluded: &HashSet<&str>,
        min_extent: f64,
    ) -> Vec<ExtractedAsset> {
        report
            .elements
            .iter()
            .filter(|e| !excluded.contains(e.name.as_str()))
            .filter(|e| e.groups.len() <= 1)
            .filter(|e| !is_rig_name(&e.name))
            .filter(|e| is_visual(e, min_extent))
            .filter_map(|e| {
                let bounds = element_bounds(e)?;
                (bounds.max_extent() > MIN_ASSET_EXTENT).then(|| ExtractedAsset {
                    name: e.name.clone(),
                    kind: ResourceKind::Object,
                    polygon_count: e.polygon_count,
                    vertex_count: e.vertex_count.max(0),
                    material_count: e.material_count.max(0),
                    object_count: 1,
                    bounds,
                })
            })
            .collect()
    }
}

/// Names of top-level, non-system groups holding mesh geometry
///
/// Used on quick-scan reports to plan per-group extraction.
pub fn top_level_groups(report: &WorkerReport) -> Vec<String> {
    let index = ReportIndex::new(report);
    index
        .top_level(report)
        .into_iter()
        .filter(|g| index.has_mesh(*g))
        .map(|g| g.name.clone())
        .collect()
}

/// Whole-file analysis: one asset per qualifying top-level group, then
/// standalone elements not captured by any of those groups
pub fn analyze_full_file(report: &WorkerReport, min_extent: f64) -> Vec<ExtractedAsset> {
    let index = ReportIndex::new(report);
    let mut assets = Vec::new();
    let mut captured: HashSet<&str> = HashSet::new();

    for group in index.top_level(report) {
        let (asset, members) = index.aggregate(group, min_extent);
        if let Some(asset) = asset {
            captured.extend(members);
            assets.push(asset);
        }
    }

    assets.extend(index.standalone(report, &captured, min_extent));
    assets
}

/// Single-group analysis; `Ok(None)` when the group has no usable geometry
pub fn analyze_single_group(
    report: &WorkerReport,
    group_name: &str,
    min_extent: f64,
) -> Result<Option<ExtractedAsset>, ExtractionError> {
    let index = ReportIndex::new(report);
    let group = index
        .groups
        .get(group_name)
        .ok_or_else(|| ExtractionError::GroupNotFound(group_name.to_string()))?;
    Ok(index.aggregate(*group, min_extent).0)
}

/// Standalone analysis: elements outside every excluded group and its
/// descendants
pub fn analyze_standalone(
    report: &WorkerReport,
    excluded_groups: &[String],
    min_extent: f64,
) -> Vec<ExtractedAsset> {
    let index = ReportIndex::new(report);
    let mut excluded: HashSet<&str> = HashSet::new();
    for name in excluded_groups {
        if let Some(group) = index.groups.get(name.as_str()) {
            excluded.extend(index.group_elements(*group).iter().map(|e| e.name.as_str()));
        }
    }
    index.standalone(report, &excluded, min_extent)
}
