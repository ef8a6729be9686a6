//! Descriptive asset tags

use scenepack_common::db::AssetTag;
use scenepack_common::Result;
use sqlx::SqlitePool;

/// Attach a tag; an existing `(asset, name, category)` tag is left as is
pub async fn add_tag(
    pool: &SqlitePool,
    asset_id: i64,
    tag_name: &str,
    tag_category: &str,
    confidence: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO asset_tags (asset_id, tag_name, tag_category, confidence)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(asset_id)
    .bind(tag_name)
    .bind(tag_category)
    .bind(confidence.clamp(0.0, 1.0))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_tags(pool: &SqlitePool, asset_id: i64) -> Result<Vec<AssetTag>> {
    let rows = sqlx::query(
        r#"
        SELECT id, asset_id, tag_name, tag_category, confidence
        FROM asset_tags
        WHERE asset_id = ?
        ORDER BY tag_category, tag_name
        "#,
    )
    .bind(asset_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(AssetTag::from_row).collect()
}
