//! Store initialization
//!
//! Creates the store file on first run, applies connection pragmas, creates
//! every table and index idempotently and seeds the default classification
//! patterns.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open (or create) the store file and make sure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Every pragma is part of the connect options so each pooled connection
    // gets them, not just the first one.
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new store: {}", db_path.display());
    } else {
        info!("Opened existing store: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory store, for tests and dry runs
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes, then seed default patterns
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_asset_packs_table(pool).await?;
    create_assets_table(pool).await?;
    create_asset_properties_table(pool).await?;
    create_asset_tags_table(pool).await?;
    create_classification_patterns_table(pool).await?;
    create_scan_queue_table(pool).await?;
    create_indexes(pool).await?;
    seed_default_patterns(pool).await?;
    Ok(())
}

async fn create_asset_packs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_packs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            version TEXT,
            path TEXT NOT NULL,
            description TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Geometric and performance fields are denormalized onto the asset row so
/// the common filter queries need no joins.
async fn create_assets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            pack_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            subcategory TEXT,
            file_path TEXT NOT NULL,
            container_path TEXT NOT NULL,
            resource_kind TEXT NOT NULL CHECK (resource_kind IN ('collection', 'object')),
            resource_name TEXT NOT NULL,

            polygon_count INTEGER NOT NULL DEFAULT 0,
            vertex_count INTEGER NOT NULL DEFAULT 0,
            material_count INTEGER NOT NULL DEFAULT 0,
            object_count INTEGER NOT NULL DEFAULT 1,

            width REAL NOT NULL DEFAULT 0.0,
            height REAL NOT NULL DEFAULT 0.0,
            depth REAL NOT NULL DEFAULT 0.0,
            volume REAL NOT NULL DEFAULT 0.0,

            complexity_score REAL NOT NULL DEFAULT 0.0,
            quality_tier TEXT NOT NULL DEFAULT 'medium',
            estimated_load_time REAL NOT NULL DEFAULT 0.0,
            memory_estimate REAL NOT NULL DEFAULT 0.0,

            primary_style TEXT,
            size_category TEXT NOT NULL DEFAULT 'medium',

            is_active INTEGER NOT NULL DEFAULT 1,
            scan_status TEXT NOT NULL DEFAULT 'pending',
            last_scanned TIMESTAMP,

            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,

            FOREIGN KEY (pack_id) REFERENCES asset_packs (id) ON DELETE CASCADE,
            UNIQUE (name, pack_id, resource_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_asset_properties_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_properties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id INTEGER NOT NULL,
            property_type TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            value_type TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (asset_id) REFERENCES assets (id) ON DELETE CASCADE,
            UNIQUE (asset_id, property_type, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_asset_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id INTEGER NOT NULL,
            tag_name TEXT NOT NULL,
            tag_category TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 1.0,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (asset_id) REFERENCES assets (id) ON DELETE CASCADE,
            UNIQUE (asset_id, tag_name, tag_category)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_classification_patterns_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classification_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_type TEXT NOT NULL CHECK (pattern_type IN ('category', 'style', 'material_family')),
            pattern_name TEXT NOT NULL,
            keywords TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.8,
            priority INTEGER NOT NULL DEFAULT 5,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_by TEXT NOT NULL DEFAULT 'system',
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (pattern_type, pattern_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scan_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_path TEXT NOT NULL UNIQUE,
            pack_id INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 5,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            assigned_worker TEXT,
            started_at TIMESTAMP,
            completed_at TIMESTAMP,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (pack_id) REFERENCES asset_packs (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_assets_fast_search ON assets(category, subcategory, quality_tier, size_category)",
        "CREATE INDEX IF NOT EXISTS idx_assets_pack ON assets(pack_id)",
        "CREATE INDEX IF NOT EXISTS idx_assets_style ON assets(primary_style, category)",
        "CREATE INDEX IF NOT EXISTS idx_assets_complexity ON assets(complexity_score, polygon_count)",
        "CREATE INDEX IF NOT EXISTS idx_assets_dimensions ON assets(width, height, depth)",
        "CREATE INDEX IF NOT EXISTS idx_properties_lookup ON asset_properties(asset_id, property_type)",
        "CREATE INDEX IF NOT EXISTS idx_patterns_lookup ON classification_patterns(pattern_type, priority)",
        "CREATE INDEX IF NOT EXISTS idx_scan_queue_status ON scan_queue(status, priority)",
        "CREATE INDEX IF NOT EXISTS idx_tags_fast ON asset_tags(asset_id, tag_category)",
        "CREATE INDEX IF NOT EXISTS idx_tags_name ON asset_tags(tag_name)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// Default pattern seed: (type, name, keywords, confidence, priority)
const DEFAULT_PATTERNS: &[(&str, &str, &[&str], f64, i64)] = &[
    (
        "category",
        "architecture",
        &["building", "wall", "roof", "door", "window", "pillar", "arch", "facade"],
        0.9,
        8,
    ),
    (
        "category",
        "vehicles",
        &["car", "truck", "bike", "vehicle", "transport", "wheel", "motorcycle"],
        0.9,
        8,
    ),
    (
        "category",
        "lighting",
        &["light", "lamp", "bulb", "neon", "led", "sign", "glow", "illumination"],
        0.8,
        7,
    ),
    (
        "category",
        "robots",
        &["robot", "bot", "drone", "mech", "android"],
        0.8,
        7,
    ),
    (
        "category",
        "nature",
        &["tree", "rock", "snow", "plant", "grass", "bush"],
        0.7,
        6,
    ),
    (
        "category",
        "props",
        &["box", "barrel", "crate", "container", "pipe", "wire", "equipment", "prop"],
        0.7,
        5,
    ),
    (
        "style",
        "cyberpunk",
        &["cyber", "neon", "hologram", "digital", "futuristic", "tech"],
        0.8,
        9,
    ),
    (
        "style",
        "industrial",
        &["industrial", "mechanical", "factory", "machinery", "steel"],
        0.8,
        8,
    ),
    (
        "style",
        "weathered",
        &["worn", "rust", "damage", "decay", "dirty", "aged"],
        0.7,
        7,
    ),
    (
        "material_family",
        "metal",
        &["steel", "iron", "aluminum", "chrome", "copper", "brass", "metal"],
        0.9,
        9,
    ),
    (
        "material_family",
        "concrete",
        &["concrete", "cement", "stone", "brick", "pavement"],
        0.9,
        9,
    ),
    (
        "material_family",
        "glass",
        &["glass", "window", "transparent", "crystal"],
        0.9,
        9,
    ),
];

/// Insert the default patterns; existing rows (including user edits) win
async fn seed_default_patterns(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (pattern_type, name, keywords, confidence, priority) in DEFAULT_PATTERNS {
        let keywords_json = serde_json::to_string(keywords)?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO classification_patterns
                (pattern_type, pattern_name, keywords, confidence, priority)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(pattern_type)
        .bind(name)
        .bind(keywords_json)
        .bind(confidence)
        .bind(priority)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
