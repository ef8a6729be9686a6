//! Store record models

use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

/// Upper sanity bound for a single asset dimension (10 km)
pub const MAX_DIMENSION: f64 = 10_000.0;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::Validation(format!(
                        "unknown {} value '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// How an asset is resolved inside its container file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Named group (instanced on placement)
    Collection,
    /// Single mesh-bearing element
    Object,
}

text_enum!(ResourceKind { Collection => "collection", Object => "object" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

text_enum!(QualityTier { Low => "low", Medium => "medium", High => "high", Ultra => "ultra" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    Huge,
}

text_enum!(SizeCategory { Small => "small", Medium => "medium", Large => "large", Huge => "huge" });

/// Scan queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

text_enum!(QueueStatus {
    Pending => "pending",
    Processing => "processing",
    Complete => "complete",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Category,
    Style,
    MaterialFamily,
}

text_enum!(PatternType {
    Category => "category",
    Style => "style",
    MaterialFamily => "material_family",
});

/// Directory tree of container files scanned as one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Pack {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            path: row.try_get("path")?,
            version: row.try_get("version")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Stored asset with its denormalized hot-path fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub name: String,
    pub pack_id: i64,
    pub category: String,
    pub subcategory: Option<String>,
    /// Container path relative to the pack root
    pub file_path: String,
    /// Absolute container path
    pub container_path: String,
    pub resource_kind: ResourceKind,
    pub resource_name: String,
    pub polygon_count: i64,
    pub vertex_count: i64,
    pub material_count: i64,
    pub object_count: i64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub volume: f64,
    pub complexity_score: f64,
    pub quality_tier: QualityTier,
    pub estimated_load_time: f64,
    pub memory_estimate: f64,
    pub primary_style: Option<String>,
    pub size_category: SizeCategory,
    pub scan_status: String,
    pub is_active: bool,
    pub last_scanned: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl AssetRecord {
    /// `[width, height, depth]`
    pub fn dimensions(&self) -> [f64; 3] {
        [self.width, self.height, self.depth]
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let resource_kind: String = row.try_get("resource_kind")?;
        let quality_tier: String = row.try_get("quality_tier")?;
        let size_category: String = row.try_get("size_category")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            pack_id: row.try_get("pack_id")?,
            category: row.try_get("category")?,
            subcategory: row.try_get("subcategory")?,
            file_path: row.try_get("file_path")?,
            container_path: row.try_get("container_path")?,
            resource_kind: resource_kind.parse()?,
            resource_name: row.try_get("resource_name")?,
            polygon_count: row.try_get("polygon_count")?,
            vertex_count: row.try_get("vertex_count")?,
            material_count: row.try_get("material_count")?,
            object_count: row.try_get("object_count")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            depth: row.try_get("depth")?,
            volume: row.try_get("volume")?,
            complexity_score: row.try_get("complexity_score")?,
            quality_tier: quality_tier.parse()?,
            estimated_load_time: row.try_get("estimated_load_time")?,
            memory_estimate: row.try_get("memory_estimate")?,
            primary_style: row.try_get("primary_style")?,
            size_category: size_category.parse()?,
            scan_status: row.try_get("scan_status")?,
            is_active: row.try_get("is_active")?,
            last_scanned: row.try_get("last_scanned")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Input for creating an asset; `volume` is derived on insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAsset {
    pub name: String,
    pub pack_id: i64,
    pub category: String,
    pub subcategory: Option<String>,
    pub file_path: String,
    pub container_path: String,
    pub resource_kind: ResourceKind,
    pub resource_name: String,
    pub polygon_count: i64,
    pub vertex_count: i64,
    pub material_count: i64,
    pub object_count: i64,
    /// `[width, height, depth]`, each in `[0, MAX_DIMENSION]`
    pub dimensions: [f64; 3],
    pub complexity_score: f64,
    pub quality_tier: QualityTier,
    pub estimated_load_time: f64,
    pub memory_estimate: f64,
    pub primary_style: Option<String>,
    pub size_category: SizeCategory,
}

impl NewAsset {
    /// Reject malformed dimensions or scores; callers clamp beforehand
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("asset name is empty".to_string()));
        }
        if self.resource_name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "asset '{}' has no resource name",
                self.name
            )));
        }
        for (axis, value) in ["width", "height", "depth"].iter().zip(self.dimensions) {
            if !value.is_finite() || !(0.0..=MAX_DIMENSION).contains(&value) {
                return Err(Error::Validation(format!(
                    "asset '{}' {} out of range: {}",
                    self.name, axis, value
                )));
            }
        }
        if !self.complexity_score.is_finite() || !(0.0..=10.0).contains(&self.complexity_score) {
            return Err(Error::Validation(format!(
                "asset '{}' complexity score out of range: {}",
                self.name, self.complexity_score
            )));
        }
        if self.polygon_count < 0 || self.vertex_count < 0 || self.object_count < 0 {
            return Err(Error::Validation(format!(
                "asset '{}' has negative geometry counters",
                self.name
            )));
        }
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        self.dimensions[0] * self.dimensions[1] * self.dimensions[2]
    }
}

/// Typed value for an extensible asset property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    #[serde(rename = "string")]
    Text(String),
    Bool(bool),
    Json(serde_json::Value),
}

impl PropertyValue {
    pub fn value_type(&self) -> &'static str {
        match self {
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Text(_) => "string",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Json(_) => "json",
        }
    }

    /// Text form persisted in `asset_properties.value`
    pub fn to_text(&self) -> Result<String> {
        Ok(match self {
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Float(v) => v.to_string(),
            PropertyValue::Text(v) => v.clone(),
            PropertyValue::Bool(v) => v.to_string(),
            PropertyValue::Json(v) => serde_json::to_string(v)?,
        })
    }

    pub fn from_text(value_type: &str, text: &str) -> Result<Self> {
        let invalid = |e: &dyn fmt::Display| {
            Error::Validation(format!("bad {} property value '{}': {}", value_type, text, e))
        };
        match value_type {
            "int" => text.parse().map(PropertyValue::Int).map_err(|e| invalid(&e)),
            "float" => text.parse().map(PropertyValue::Float).map_err(|e| invalid(&e)),
            "bool" => text.parse().map(PropertyValue::Bool).map_err(|e| invalid(&e)),
            "json" => Ok(PropertyValue::Json(serde_json::from_str(text)?)),
            "string" => Ok(PropertyValue::Text(text.to_string())),
            other => Err(Error::Validation(format!("unknown property value type '{}'", other))),
        }
    }
}

/// Low-frequency metadata kept off the asset row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetProperty {
    pub id: i64,
    pub asset_id: i64,
    pub property_type: String,
    pub key: String,
    pub value: PropertyValue,
}

impl AssetProperty {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let value_type: String = row.try_get("value_type")?;
        let text: String = row.try_get("value")?;
        Ok(Self {
            id: row.try_get("id")?,
            asset_id: row.try_get("asset_id")?,
            property_type: row.try_get("property_type")?,
            key: row.try_get("key")?,
            value: PropertyValue::from_text(&value_type, &text)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetTag {
    pub id: i64,
    pub asset_id: i64,
    pub tag_name: String,
    pub tag_category: String,
    pub confidence: f64,
}

impl AssetTag {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            asset_id: row.try_get("asset_id")?,
            tag_name: row.try_get("tag_name")?,
            tag_category: row.try_get("tag_category")?,
            confidence: row.try_get("confidence")?,
        })
    }
}

/// Keyword pattern mapping names to a label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPattern {
    pub pattern_type: PatternType,
    pub pattern_name: String,
    /// Ordered keyword set
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub priority: i64,
    pub is_active: bool,
}

impl ClassificationPattern {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let pattern_type: String = row.try_get("pattern_type")?;
        let keywords: String = row.try_get("keywords")?;
        Ok(Self {
            pattern_type: pattern_type.parse()?,
            pattern_name: row.try_get("pattern_name")?,
            keywords: serde_json::from_str(&keywords)?,
            confidence: row.try_get("confidence")?,
            priority: row.try_get("priority")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

/// Immutable set of active patterns handed to one scan
///
/// Each list is ordered by `(priority desc, confidence desc)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub category: Vec<ClassificationPattern>,
    pub style: Vec<ClassificationPattern>,
    pub material_family: Vec<ClassificationPattern>,
}

impl PatternSnapshot {
    pub fn patterns(&self, pattern_type: PatternType) -> &[ClassificationPattern] {
        match pattern_type {
            PatternType::Category => &self.category,
            PatternType::Style => &self.style,
            PatternType::MaterialFamily => &self.material_family,
        }
    }

    pub fn len(&self) -> usize {
        self.category.len() + self.style.len() + self.material_family.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resumable work queue entry, one per container file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanQueueItem {
    pub id: i64,
    pub container_path: String,
    pub pack_id: i64,
    pub priority: i64,
    pub status: QueueStatus,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub assigned_worker: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl ScanQueueItem {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            container_path: row.try_get("container_path")?,
            pack_id: row.try_get("pack_id")?,
            priority: row.try_get("priority")?,
            status: status.parse()?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            assigned_worker: row.try_get("assigned_worker")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> NewAsset {
        NewAsset {
            name: "Crate_01".to_string(),
            pack_id: 1,
            category: "props".to_string(),
            subcategory: None,
            file_path: "crates.blend".to_string(),
            container_path: "/packs/a/crates.blend".to_string(),
            resource_kind: ResourceKind::Object,
            resource_name: "Crate_01".to_string(),
            polygon_count: 120,
            vertex_count: 96,
            material_count: 1,
            object_count: 1,
            dimensions: [1.0, 1.0, 1.0],
            complexity_score: 3.0,
            quality_tier: QualityTier::Low,
            estimated_load_time: 0.1,
            memory_estimate: 1.0,
            primary_style: None,
            size_category: SizeCategory::Medium,
        }
    }

    #[test]
    fn test_enum_text_round_trip() {
        assert_eq!("collection".parse::<ResourceKind>().unwrap(), ResourceKind::Collection);
        assert_eq!(QualityTier::Ultra.as_str(), "ultra");
        assert_eq!("material_family".parse::<PatternType>().unwrap(), PatternType::MaterialFamily);
        assert!("sideways".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_quality_tier_ordering() {
        assert!(QualityTier::Low < QualityTier::Medium);
        assert!(QualityTier::High < QualityTier::Ultra);
    }

    #[test]
    fn test_new_asset_rejects_out_of_range_dimension() {
        let mut asset = sample_asset();
        asset.dimensions = [1.0, -0.5, 1.0];
        assert!(matches!(asset.validate(), Err(Error::Validation(_))));

        asset.dimensions = [1.0, 1.0, 20_000.0];
        assert!(asset.validate().is_err());

        asset.dimensions = [f64::NAN, 1.0, 1.0];
        assert!(asset.validate().is_err());
    }

    #[test]
    fn test_new_asset_volume() {
        let mut asset = sample_asset();
        asset.dimensions = [2.0, 3.0, 1.5];
        assert!(asset.validate().is_ok());
        assert_eq!(asset.volume(), 9.0);
    }

    #[test]
    fn test_property_value_text_forms() {
        let json = PropertyValue::Json(serde_json::json!([0.0, 1.5, -2.0]));
        let text = json.to_text().unwrap();
        assert_eq!(PropertyValue::from_text("json", &text).unwrap(), json);

        assert_eq!(PropertyValue::from_text("int", "42").unwrap(), PropertyValue::Int(42));
        assert!(PropertyValue::from_text("int", "forty").is_err());
        assert!(PropertyValue::from_text("blob", "x").is_err());
    }
}
