//! Classification pattern storage

use scenepack_common::db::{ClassificationPattern, PatternSnapshot, PatternType};
use scenepack_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Active patterns of one type, ordered by `(priority desc, confidence desc)`
pub async fn get_classification_patterns(
    pool: &SqlitePool,
    pattern_type: PatternType,
) -> Result<Vec<ClassificationPattern>> {
    let rows = sqlx::query(
        r#"
        SELECT pattern_type, pattern_name, keywords, confidence, priority, is_active
        FROM classification_patterns
        WHERE pattern_type = ? AND is_active = 1
        ORDER BY priority DESC, confidence DESC, id ASC
        "#,
    )
    .bind(pattern_type.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(ClassificationPattern::from_row).collect()
}

/// Add or replace a user pattern
pub async fn add_classification_pattern(
    pool: &SqlitePool,
    pattern_type: PatternType,
    pattern_name: &str,
    keywords: &[String],
    confidence: f64,
    priority: i64,
) -> Result<()> {
    if pattern_name.trim().is_empty() {
        return Err(Error::InvalidInput("pattern name is empty".to_string()));
    }
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Err(Error::InvalidInput(format!(
            "pattern '{}' has no keywords",
            pattern_name
        )));
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::InvalidInput(format!(
            "confidence must be within [0, 1], got {}",
            confidence
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO classification_patterns
            (pattern_type, pattern_name, keywords, confidence, priority, is_active, created_by)
        VALUES (?, ?, ?, ?, ?, 1, 'user')
        ON CONFLICT(pattern_type, pattern_name) DO UPDATE SET
            keywords = excluded.keywords,
            confidence = excluded.confidence,
            priority = excluded.priority,
            is_active = 1,
            created_by = 'user'
        "#,
    )
    .bind(pattern_type.as_str())
    .bind(pattern_name)
    .bind(serde_json::to_string(&keywords)?)
    .bind(confidence)
    .bind(priority)
    .execute(pool)
    .await?;

    debug!(pattern_type = %pattern_type, pattern = pattern_name, "Stored classification pattern");
    Ok(())
}

pub async fn set_pattern_active(
    pool: &SqlitePool,
    pattern_type: PatternType,
    pattern_name: &str,
    active: bool,
) -> Result<()> {
    let done = sqlx::query(
        "UPDATE classification_patterns SET is_active = ? WHERE pattern_type = ? AND pattern_name = ?",
    )
    .bind(active)
    .bind(pattern_type.as_str())
    .bind(pattern_name)
    .execute(pool)
    .await?;

    if done.rows_affected() == 0 {
        return Err(Error::NotFound(format!("pattern {}/{}", pattern_type, pattern_name)));
    }
    Ok(())
}

/// Immutable copy of every active pattern, taken once per scan
pub async fn load_pattern_snapshot(pool: &SqlitePool) -> Result<PatternSnapshot> {
    Ok(PatternSnapshot {
        category: get_classification_patterns(pool, PatternType::Category).await?,
        style: get_classification_patterns(pool, PatternType::Style).await?,
        material_family: get_classification_patterns(pool, PatternType::MaterialFamily).await?,
    })
}
