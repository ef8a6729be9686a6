//! Resumable scan work queue
//!
//! One row per container file. Workers claim rows with [`dequeue_next`],
//! which flips `pending` to `processing` in a single statement so two
//! workers can never claim the same row.

use scenepack_common::db::{QueueStatus, ScanQueueItem};
use scenepack_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Queue a container file
///
/// Idempotent on the path: an existing row is reused. A row that already
/// finished (`complete` or `failed`) is re-armed to `pending` with a fresh
/// retry budget; a row still `pending` or `processing` is left untouched.
pub async fn enqueue(
    pool: &SqlitePool,
    container_path: &str,
    pack_id: i64,
    priority: i64,
    max_retries: i64,
) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO scan_queue (container_path, pack_id, priority, max_retries)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(container_path) DO UPDATE SET
            pack_id = excluded.pack_id,
            priority = excluded.priority,
            max_retries = excluded.max_retries,
            status = 'pending',
            retry_count = 0,
            error_message = NULL,
            assigned_worker = NULL,
            started_at = NULL,
            completed_at = NULL
        WHERE scan_queue.status IN ('complete', 'failed')
        "#,
    )
    .bind(container_path)
    .bind(pack_id)
    .bind(priority)
    .bind(max_retries)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM scan_queue WHERE container_path = ?")
        .bind(container_path)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

/// Atomically claim the highest-priority pending item
///
/// Only items with `retry_count < max_retries` are eligible. `pack_id`
/// restricts the claim to one pack's items.
pub async fn dequeue_next(
    pool: &SqlitePool,
    worker_id: &str,
    pack_id: Option<i64>,
) -> Result<Option<ScanQueueItem>> {
    let row = sqlx::query(
        r#"
        UPDATE scan_queue
        SET status = 'processing', assigned_worker = ?, started_at = CURRENT_TIMESTAMP
        WHERE id = (
            SELECT id FROM scan_queue
            WHERE status = 'pending'
              AND retry_count < max_retries
              AND (? IS NULL OR pack_id = ?)
            ORDER BY priority DESC, id ASC
            LIMIT 1
        )
        AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(worker_id)
    .bind(pack_id)
    .bind(pack_id)
    .fetch_optional(pool)
    .await?;

    let item = row.as_ref().map(ScanQueueItem::from_row).transpose()?;
    if let Some(item) = &item {
        debug!(worker = worker_id, item_id = item.id, file = %item.container_path, "Claimed queue item");
    }
    Ok(item)
}

pub async fn complete_item(pool: &SqlitePool, id: i64) -> Result<()> {
    let done = sqlx::query(
        r#"
        UPDATE scan_queue
        SET status = 'complete', error_message = NULL, completed_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if done.rows_affected() == 0 {
        return Err(Error::NotFound(format!("queue item {}", id)));
    }
    Ok(())
}

/// Record a failed attempt
///
/// Increments `retry_count`. The item returns to `pending` while attempts
/// remain, otherwise it becomes `failed` for good. Returns the new status.
pub async fn fail_item(pool: &SqlitePool, id: i64, message: &str) -> Result<QueueStatus> {
    let row = sqlx::query(
        r#"
        UPDATE scan_queue
        SET retry_count = retry_count + 1,
            error_message = ?,
            assigned_worker = NULL,
            status = CASE WHEN retry_count + 1 < max_retries THEN 'pending' ELSE 'failed' END,
            completed_at = CASE WHEN retry_count + 1 < max_retries THEN NULL ELSE CURRENT_TIMESTAMP END
        WHERE id = ?
        RETURNING status, retry_count, max_retries
        "#,
    )
    .bind(message)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("queue item {}", id)))?;

    let status: String = row.try_get("status")?;
    let status: QueueStatus = status.parse()?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let max_retries: i64 = row.try_get("max_retries")?;

    if status == QueueStatus::Failed {
        warn!(item_id = id, retry_count, "Queue item permanently failed: {}", message);
    } else {
        debug!(item_id = id, retry_count, max_retries, "Queue item returned to pending");
    }
    Ok(status)
}

/// Return `processing` items whose claim is older than `older_than` to `pending`
///
/// Recovers items orphaned by a crashed or killed scan.
pub async fn requeue_stale(pool: &SqlitePool, older_than: Duration) -> Result<u64> {
    let modifier = format!("-{} seconds", older_than.as_secs());
    let done = sqlx::query(
        r#"
        UPDATE scan_queue
        SET status = 'pending', assigned_worker = NULL, started_at = NULL
        WHERE status = 'processing'
          AND (started_at IS NULL OR started_at <= datetime('now', ?))
        "#,
    )
    .bind(modifier)
    .execute(pool)
    .await?;

    let requeued = done.rows_affected();
    if requeued > 0 {
        info!(requeued, "Requeued stale scan items");
    }
    Ok(requeued)
}

pub async fn get_item(pool: &SqlitePool, id: i64) -> Result<Option<ScanQueueItem>> {
    let row = sqlx::query("SELECT * FROM scan_queue WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(ScanQueueItem::from_row).transpose()
}

pub async fn list_items(pool: &SqlitePool, pack_id: i64) -> Result<Vec<ScanQueueItem>> {
    let rows = sqlx::query("SELECT * FROM scan_queue WHERE pack_id = ? ORDER BY priority DESC, id ASC")
        .bind(pack_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(ScanQueueItem::from_row).collect()
}

/// Item count per status, optionally for one pack
pub async fn queue_status_counts(
    pool: &SqlitePool,
    pack_id: Option<i64>,
) -> Result<BTreeMap<String, i64>> {
    let rows = sqlx::query(
        r#"
        SELECT status, COUNT(*) AS n FROM scan_queue
        WHERE (? IS NULL OR pack_id = ?)
        GROUP BY status
        "#,
    )
    .bind(pack_id)
    .bind(pack_id)
    .fetch_all(pool)
    .await?;

    let mut counts = BTreeMap::new();
    for row in rows {
        counts.insert(row.try_get("status")?, row.try_get("n")?);
    }
    Ok(counts)
}
