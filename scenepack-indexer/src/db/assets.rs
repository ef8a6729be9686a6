//! Asset records and selection queries
//!
//! `search` is the hot path: equality and range predicates on denormalized
//! columns only, no joins. `search_by_tag` joins `asset_tags` and is the
//! slower secondary path.

use scenepack_common::db::{AssetRecord, NewAsset, QualityTier, SizeCategory};
use scenepack_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_SEARCH_LIMIT: i64 = 100;

/// Filters for the join-free search path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetFilters {
    pub category: Option<String>,
    pub style: Option<String>,
    pub quality_tier: Option<QualityTier>,
    pub size_category: Option<SizeCategory>,
    pub max_complexity: Option<f64>,
    pub max_polygons: Option<i64>,
    pub pack_id: Option<i64>,
    /// Defaults to [`DEFAULT_SEARCH_LIMIT`]
    pub limit: Option<i64>,
}

/// Tag-based selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagQuery {
    pub tags: Vec<String>,
    /// Restrict matching to one tag category (e.g. `style`)
    pub tag_category: Option<String>,
    /// Require every tag instead of any
    pub match_all: bool,
    pub pack_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Insert or refresh an asset row, returning its id
///
/// Keyed on `(name, pack_id, resource_name)`: re-extracting an unchanged
/// container updates the existing row and reactivates it.
pub async fn create_asset(pool: &SqlitePool, asset: &NewAsset) -> Result<i64> {
    asset.validate()?;
    let [width, height, depth] = asset.dimensions;

    let row = sqlx::query(
        r#"
        INSERT INTO assets (
            name, pack_id, category, subcategory, file_path, container_path,
            resource_kind, resource_name,
            polygon_count, vertex_count, material_count, object_count,
            width, height, depth, volume,
            complexity_score, quality_tier, estimated_load_time, memory_estimate,
            primary_style, size_category,
            is_active, scan_status, last_scanned
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                1, 'complete', CURRENT_TIMESTAMP)
        ON CONFLICT(name, pack_id, resource_name) DO UPDATE SET
            category = excluded.category,
            subcategory = excluded.subcategory,
            file_path = excluded.file_path,
            container_path = excluded.container_path,
            resource_kind = excluded.resource_kind,
            polygon_count = excluded.polygon_count,
            vertex_count = excluded.vertex_count,
            material_count = excluded.material_count,
            object_count = excluded.object_count,
            width = excluded.width,
            height = excluded.height,
            depth = excluded.depth,
            volume = excluded.volume,
            complexity_score = excluded.complexity_score,
            quality_tier = excluded.quality_tier,
            estimated_load_time = excluded.estimated_load_time,
            memory_estimate = excluded.memory_estimate,
            primary_style = excluded.primary_style,
            size_category = excluded.size_category,
            is_active = 1,
            scan_status = 'complete',
            last_scanned = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(&asset.name)
    .bind(asset.pack_id)
    .bind(&asset.category)
    .bind(&asset.subcategory)
    .bind(&asset.file_path)
    .bind(&asset.container_path)
    .bind(asset.resource_kind.as_str())
    .bind(&asset.resource_name)
    .bind(asset.polygon_count)
    .bind(asset.vertex_count)
    .bind(asset.material_count)
    .bind(asset.object_count)
    .bind(width)
    .bind(height)
    .bind(depth)
    .bind(asset.volume())
    .bind(asset.complexity_score)
    .bind(asset.quality_tier.as_str())
    .bind(asset.estimated_load_time)
    .bind(asset.memory_estimate)
    .bind(&asset.primary_style)
    .bind(asset.size_category.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("id")?)
}

pub async fn get_asset(pool: &SqlitePool, id: i64) -> Result<Option<AssetRecord>> {
    let row = sqlx::query("SELECT * FROM assets WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(AssetRecord::from_row).transpose()
}

/// Fetch records for `ids`, in the order requested
///
/// Unknown ids are skipped; duplicates yield the same record twice.
pub async fn get_assets_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<AssetRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM assets WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows = qb.build().fetch_all(pool).await?;
    let mut by_id = HashMap::with_capacity(rows.len());
    for row in &rows {
        let record = AssetRecord::from_row(row)?;
        by_id.insert(record.id, record);
    }

    Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
}

/// Join-free selection over active assets
///
/// Ordered by `(complexity_score, polygon_count)` ascending.
pub async fn search(pool: &SqlitePool, filters: &AssetFilters) -> Result<Vec<AssetRecord>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM assets WHERE is_active = 1");

    if let Some(category) = &filters.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(style) = &filters.style {
        qb.push(" AND primary_style = ").push_bind(style.clone());
    }
    if let Some(tier) = filters.quality_tier {
        qb.push(" AND quality_tier = ").push_bind(tier.as_str());
    }
    if let Some(size) = filters.size_category {
        qb.push(" AND size_category = ").push_bind(size.as_str());
    }
    if let Some(max_complexity) = filters.max_complexity {
        qb.push(" AND complexity_score <= ").push_bind(max_complexity);
    }
    if let Some(max_polygons) = filters.max_polygons {
        qb.push(" AND polygon_count <= ").push_bind(max_polygons);
    }
    if let Some(pack_id) = filters.pack_id {
        qb.push(" AND pack_id = ").push_bind(pack_id);
    }

    qb.push(" ORDER BY complexity_score ASC, polygon_count ASC, id ASC LIMIT ")
        .push_bind(limit_or_default(filters.limit)?);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(AssetRecord::from_row).collect()
}

/// Tag-based selection; joins `asset_tags`
pub async fn search_by_tag(pool: &SqlitePool, query: &TagQuery) -> Result<Vec<AssetRecord>> {
    let tags: BTreeSet<&str> = query.tags.iter().map(String::as_str).collect();
    if tags.is_empty() {
        return Err(Error::InvalidInput("tag search needs at least one tag".to_string()));
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT a.* FROM assets a JOIN asset_tags t ON t.asset_id = a.id WHERE a.is_active = 1 AND t.tag_name IN (",
    );
    let mut separated = qb.separated(", ");
    for tag in &tags {
        separated.push_bind(tag.to_string());
    }
    separated.push_unseparated(")");

    if let Some(category) = &query.tag_category {
        qb.push(" AND t.tag_category = ").push_bind(category.clone());
    }
    if let Some(pack_id) = query.pack_id {
        qb.push(" AND a.pack_id = ").push_bind(pack_id);
    }

    qb.push(" GROUP BY a.id");
    if query.match_all {
        qb.push(" HAVING COUNT(DISTINCT t.tag_name) = ")
            .push_bind(tags.len() as i64);
    }

    qb.push(" ORDER BY a.complexity_score ASC, a.polygon_count ASC, a.id ASC LIMIT ")
        .push_bind(limit_or_default(query.limit)?);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(AssetRecord::from_row).collect()
}

/// Active asset count, optionally for one pack
pub async fn count_assets(pool: &SqlitePool, pack_id: Option<i64>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM assets WHERE is_active = 1 AND (? IS NULL OR pack_id = ?)",
    )
    .bind(pack_id)
    .bind(pack_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Active asset count per category
pub async fn category_breakdown(pool: &SqlitePool, pack_id: i64) -> Result<BTreeMap<String, i64>> {
    breakdown(pool, "category", pack_id).await
}

/// Active asset count per quality tier
pub async fn quality_breakdown(pool: &SqlitePool, pack_id: i64) -> Result<BTreeMap<String, i64>> {
    breakdown(pool, "quality_tier", pack_id).await
}

async fn breakdown(pool: &SqlitePool, column: &'static str, pack_id: i64) -> Result<BTreeMap<String, i64>> {
    let sql = format!(
        "SELECT {col} AS label, COUNT(*) AS n FROM assets WHERE is_active = 1 AND pack_id = ? GROUP BY {col}",
        col = column
    );

    let rows = sqlx::query(&sql).bind(pack_id).fetch_all(pool).await?;
    let mut counts = BTreeMap::new();
    for row in rows {
        counts.insert(row.try_get("label")?, row.try_get("n")?);
    }
    Ok(counts)
}

/// Logical delete of every asset in a pack
pub async fn deactivate_pack_assets(pool: &SqlitePool, pack_id: i64) -> Result<u64> {
    let done = sqlx::query(
        "UPDATE assets SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE pack_id = ? AND is_active = 1",
    )
    .bind(pack_id)
    .execute(pool)
    .await?;

    Ok(done.rows_affected())
}

fn limit_or_default(limit: Option<i64>) -> Result<i64> {
    match limit {
        None => Ok(DEFAULT_SEARCH_LIMIT),
        Some(n) if n > 0 => Ok(n),
        Some(n) => Err(Error::InvalidInput(format!("limit must be positive, got {}", n))),
    }
}
