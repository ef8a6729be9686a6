//! Classification engine
//!
//! Pure functions: keyword classification of names against a pattern
//! snapshot, and the geometry tiers stored on every asset.

use scenepack_common::db::{
    ClassificationPattern, PatternSnapshot, QualityTier, SizeCategory, MAX_DIMENSION,
};
use serde::{Deserialize, Serialize};

/// Category used when no category pattern matches
pub const DEFAULT_CATEGORY: &str = "props";

/// A pattern that matched a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub label: String,
    pub confidence: f64,
}

/// Category, style and material family for one name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: PatternMatch,
    pub style: Option<PatternMatch>,
    pub material_family: Option<PatternMatch>,
}

/// Best matching pattern for `name`, if any
///
/// A pattern matches when any of its keywords is a case-insensitive
/// substring of the name. The highest confidence wins; on a tie the pattern
/// seen first wins, so the caller's ordering (priority first) decides.
pub fn classify<'a>(name: &str, patterns: &'a [ClassificationPattern]) -> Option<&'a ClassificationPattern> {
    if name.is_empty() {
        return None;
    }
    let name_lower = name.to_lowercase();

    let mut best: Option<&ClassificationPattern> = None;
    for pattern in patterns.iter().filter(|p| p.is_active) {
        let matched = pattern
            .keywords
            .iter()
            .any(|k| !k.is_empty() && name_lower.contains(&k.to_lowercase()));
        if !matched {
            continue;
        }
        match best {
            Some(current) if pattern.confidence <= current.confidence => {}
            _ => best = Some(pattern),
        }
    }
    best
}

/// Classify a name against every pattern type in the snapshot
pub fn classify_all(name: &str, snapshot: &PatternSnapshot) -> Classification {
    let to_match = |p: &ClassificationPattern| PatternMatch {
        label: p.pattern_name.clone(),
        confidence: p.confidence,
    };

    Classification {
        category: classify(name, &snapshot.category)
            .map(to_match)
            .unwrap_or_else(|| PatternMatch {
                label: DEFAULT_CATEGORY.to_string(),
                confidence: 1.0,
            }),
        style: classify(name, &snapshot.style).map(to_match),
        material_family: classify(name, &snapshot.material_family).map(to_match),
    }
}

/// Complexity score in `[0, 10]`
///
/// Polygon bands `<100, <500, <2000, <10000, >=10000` give base scores
/// `1, 3, 5, 7, 9`, scaled by `1 + 0.1 per extra object` (at most 2x).
pub fn complexity_score(polygon_count: i64, object_count: i64) -> f64 {
    let base = match polygon_count.max(0) {
        p if p < 100 => 1.0,
        p if p < 500 => 3.0,
        p if p < 2000 => 5.0,
        p if p < 10_000 => 7.0,
        _ => 9.0,
    };
    let extra_objects = (object_count.max(1) - 1) as f64;
    let multiplier = (1.0 + 0.1 * extra_objects).min(2.0);
    (base * multiplier).min(10.0)
}

pub fn quality_tier(polygon_count: i64) -> QualityTier {
    match polygon_count {
        p if p < 500 => QualityTier::Low,
        p if p < 2000 => QualityTier::Medium,
        p if p < 10_000 => QualityTier::High,
        _ => QualityTier::Ultra,
    }
}

/// Size bucket from the largest dimension, in meters
pub fn size_category(width: f64, height: f64, depth: f64) -> SizeCategory {
    let max = width.max(height).max(depth);
    if max < 0.5 {
        SizeCategory::Small
    } else if max < 2.0 {
        SizeCategory::Medium
    } else if max < 10.0 {
        SizeCategory::Large
    } else {
        SizeCategory::Huge
    }
}

/// Tag label for a complexity score
pub fn complexity_bucket(score: f64) -> &'static str {
    if score <= 3.0 {
        "simple"
    } else if score <= 6.0 {
        "moderate"
    } else {
        "complex"
    }
}

/// Seconds
pub fn estimated_load_time(polygon_count: i64) -> f64 {
    (polygon_count.max(0) as f64 / 10_000.0).max(0.1)
}

/// Megabytes
pub fn memory_estimate(polygon_count: i64) -> f64 {
    (polygon_count.max(0) as f64 / 1000.0).max(1.0)
}

/// Out-of-range dimensions become 0.0 instead of failing the record
pub fn clamp_dimension(value: f64) -> f64 {
    if value.is_finite() && (0.0..=MAX_DIMENSION).contains(&value) {
        value
    } else {
        0.0
    }
}
