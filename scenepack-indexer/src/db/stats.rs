//! Store-wide statistics

use super::scan_queue::queue_status_counts;
use scenepack_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

const COUNTED_TABLES: &[&str] = &[
    "asset_packs",
    "assets",
    "asset_properties",
    "asset_tags",
    "classification_patterns",
    "scan_queue",
];

/// Row count per table plus the queue status breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub tables: BTreeMap<String, i64>,
    pub scan_queue_status: BTreeMap<String, i64>,
}

impl StoreStats {
    pub fn rows(&self, table: &str) -> i64 {
        self.tables.get(table).copied().unwrap_or(0)
    }
}

pub async fn store_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let mut tables = BTreeMap::new();
    for table in COUNTED_TABLES {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
        tables.insert(table.to_string(), n);
    }

    Ok(StoreStats {
        tables,
        scan_queue_status: queue_status_counts(pool, None).await?,
    })
}
