//! Scan progress events and the EventBus that carries them
//!
//! Worker tasks emit [`ScanEvent`]s; the host side drains them from its own
//! loop (see the indexer's `StatusPoller`) and never shares state with a
//! worker directly.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scan lifecycle events
///
/// Serialized with a `type` tag so a host UI can consume them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// Discovery finished and files were queued
    ScanStarted {
        scan_id: Uuid,
        pack_id: i64,
        pack_name: String,
        files_queued: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A worker picked up a container file
    FileStarted {
        scan_id: Uuid,
        worker: String,
        container_path: String,
        /// `whole_file` or `incremental`
        strategy: String,
    },

    /// Assets from one container file were stored
    FileCompleted {
        scan_id: Uuid,
        worker: String,
        container_path: String,
        assets_stored: usize,
    },

    /// Extraction of a container file failed
    FileFailed {
        scan_id: Uuid,
        worker: String,
        container_path: String,
        error: String,
    },

    /// One group failed during incremental extraction; the file continues
    GroupFailed {
        scan_id: Uuid,
        container_path: String,
        group: String,
        error: String,
    },

    /// Terminal event; pollers deregister once they see it
    ScanComplete {
        scan_id: Uuid,
        files_processed: usize,
        files_failed: usize,
        total_assets: i64,
        duration_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ScanEvent {
    pub fn scan_id(&self) -> Uuid {
        match self {
            ScanEvent::ScanStarted { scan_id, .. }
            | ScanEvent::FileStarted { scan_id, .. }
            | ScanEvent::FileCompleted { scan_id, .. }
            | ScanEvent::FileFailed { scan_id, .. }
            | ScanEvent::GroupFailed { scan_id, .. }
            | ScanEvent::ScanComplete { scan_id, .. } => *scan_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanEvent::ScanComplete { .. })
    }
}

/// Central distribution bus for scan events
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// see `Lagged` instead of stalling workers.
///
/// ```
/// use scenepack_common::events::{EventBus, ScanEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(ScanEvent::GroupFailed {
///     scan_id: uuid::Uuid::new_v4(),
///     container_path: "/packs/city.blend".to_string(),
///     group: "Tower".to_string(),
///     error: "timeout".to_string(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Receiver for events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is subscribed
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ScanEvent) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
