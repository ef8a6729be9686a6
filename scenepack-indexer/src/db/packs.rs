//! Pack records

use scenepack_common::db::Pack;
use scenepack_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Create a pack; the name must be unused
pub async fn create_pack(
    pool: &SqlitePool,
    name: &str,
    path: &str,
    version: Option<&str>,
    description: Option<&str>,
) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("pack name is empty".to_string()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO asset_packs (name, path, version, description)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(path)
    .bind(version)
    .bind(description)
    .execute(pool)
    .await
    .map_err(Error::from);

    match result {
        Ok(done) => {
            let id = done.last_insert_rowid();
            info!(pack_id = id, pack = name, "Created pack");
            Ok(id)
        }
        Err(e) if e.is_unique_violation() => Err(Error::DuplicateName(name.to_string())),
        Err(e) => Err(e),
    }
}

pub async fn get_pack(pool: &SqlitePool, id: i64) -> Result<Option<Pack>> {
    let row = sqlx::query("SELECT * FROM asset_packs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Pack::from_row).transpose()
}

pub async fn get_pack_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Pack>> {
    let row = sqlx::query("SELECT * FROM asset_packs WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Pack::from_row).transpose()
}

pub async fn list_packs(pool: &SqlitePool) -> Result<Vec<Pack>> {
    let rows = sqlx::query("SELECT * FROM asset_packs ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(Pack::from_row).collect()
}

/// Point an existing pack at a new root directory
pub async fn update_pack_path(pool: &SqlitePool, id: i64, path: &str) -> Result<()> {
    let done = sqlx::query(
        "UPDATE asset_packs SET path = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(path)
    .bind(id)
    .execute(pool)
    .await?;

    if done.rows_affected() == 0 {
        return Err(Error::NotFound(format!("pack {}", id)));
    }
    Ok(())
}

/// Remove every asset, property, tag and queue item of a pack
///
/// The pack row itself is kept. Runs in one transaction.
pub async fn clear_pack(pool: &SqlitePool, pack_id: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM asset_tags WHERE asset_id IN (SELECT id FROM assets WHERE pack_id = ?)")
        .bind(pack_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "DELETE FROM asset_properties WHERE asset_id IN (SELECT id FROM assets WHERE pack_id = ?)",
    )
    .bind(pack_id)
    .execute(&mut *tx)
    .await?;
    let assets = sqlx::query("DELETE FROM assets WHERE pack_id = ?")
        .bind(pack_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM scan_queue WHERE pack_id = ?")
        .bind(pack_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(pack_id, assets_removed = assets, "Cleared pack contents");
    Ok(assets)
}
