//! Extensible per-asset properties

use scenepack_common::db::{AssetProperty, PropertyValue};
use scenepack_common::Result;
use sqlx::SqlitePool;

/// Insert or replace one property value
pub async fn set_property(
    pool: &SqlitePool,
    asset_id: i64,
    property_type: &str,
    key: &str,
    value: &PropertyValue,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO asset_properties (asset_id, property_type, key, value, value_type)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(asset_id, property_type, key) DO UPDATE SET
            value = excluded.value,
            value_type = excluded.value_type
        "#,
    )
    .bind(asset_id)
    .bind(property_type)
    .bind(key)
    .bind(value.to_text()?)
    .bind(value.value_type())
    .execute(pool)
    .await?;

    Ok(())
}

/// Properties of an asset, optionally of one type, ordered by key
pub async fn get_properties(
    pool: &SqlitePool,
    asset_id: i64,
    property_type: Option<&str>,
) -> Result<Vec<AssetProperty>> {
    let rows = sqlx::query(
        r#"
        SELECT id, asset_id, property_type, key, value, value_type
        FROM asset_properties
        WHERE asset_id = ? AND (? IS NULL OR property_type = ?)
        ORDER BY property_type, key
        "#,
    )
    .bind(asset_id)
    .bind(property_type)
    .bind(property_type)
    .fetch_all(pool)
    .await?;

    rows.iter().map(AssetProperty::from_row).collect()
}
