//! Host-loop progress polling
//!
//! Workers publish [`ScanEvent`]s on the [`EventBus`]. A single-threaded host
//! loop owns a [`StatusPoller`] and calls [`StatusPoller::poll`] from its own
//! timer; the poller drains whatever is queued without blocking and tells the
//! caller whether to re-arm the timer.

use scenepack_common::events::{EventBus, ScanEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;
use uuid::Uuid;

/// What the host loop should do after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Scan still running; poll again later
    Rearm,
    /// Scan finished (or the bus closed); deregister the poll
    Done,
}

/// Snapshot of scan progress as seen by the host
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatusView {
    pub scan_id: Option<Uuid>,
    pub pack_name: Option<String>,
    pub files_queued: usize,
    pub files_completed: usize,
    /// Failed attempts, including ones the queue will retry
    pub failed_attempts: usize,
    /// Files failed for good; known once the scan completes
    pub files_failed: usize,
    pub groups_failed: usize,
    pub assets_stored: usize,
    /// Container file each worker is on
    pub active: BTreeMap<String, String>,
    pub last_error: Option<String>,
    pub total_assets: Option<i64>,
    pub complete: bool,
    /// Events dropped because the poller fell behind
    pub missed_events: u64,
}

impl ScanStatusView {
    fn apply(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::ScanStarted {
                scan_id,
                pack_name,
                files_queued,
                ..
            } => {
                self.scan_id = Some(*scan_id);
                self.pack_name = Some(pack_name.clone());
                self.files_queued = *files_queued;
            }
            ScanEvent::FileStarted {
                worker,
                container_path,
                ..
            } => {
                self.active.insert(worker.clone(), container_path.clone());
            }
            ScanEvent::FileCompleted {
                worker,
                assets_stored,
                ..
            } => {
                self.active.remove(worker);
                self.files_completed += 1;
                self.assets_stored += assets_stored;
            }
            ScanEvent::FileFailed { worker, error, .. } => {
                self.active.remove(worker);
                self.failed_attempts += 1;
                self.last_error = Some(error.clone());
            }
            ScanEvent::GroupFailed { group, error, .. } => {
                self.groups_failed += 1;
                self.last_error = Some(format!("{}: {}", group, error));
            }
            ScanEvent::ScanComplete {
                files_processed,
                files_failed,
                total_assets,
                ..
            } => {
                self.active.clear();
                self.files_completed = *files_processed;
                self.files_failed = *files_failed;
                self.total_assets = Some(*total_assets);
                self.complete = true;
            }
        }
    }

    /// Whether an event belongs to the scan this view follows
    fn follows(&self, event: &ScanEvent) -> bool {
        match self.scan_id {
            Some(id) => event.scan_id() == id,
            None => true,
        }
    }
}

/// Non-blocking consumer of scan events for a host event loop
pub struct StatusPoller {
    rx: broadcast::Receiver<ScanEvent>,
    view: ScanStatusView,
}

impl StatusPoller {
    /// Subscribe before starting the scan so `ScanStarted` is not missed
    pub fn new(bus: &EventBus) -> Self {
        Self {
            rx: bus.subscribe(),
            view: ScanStatusView::default(),
        }
    }

    pub fn view(&self) -> &ScanStatusView {
        &self.view
    }

    /// Drain every queued event and report whether to poll again
    pub fn poll(&mut self) -> PollOutcome {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if !self.view.follows(&event) {
                        continue;
                    }
                    self.view.apply(&event);
                    if event.is_terminal() {
                        return PollOutcome::Done;
                    }
                }
                Err(TryRecvError::Empty) => return PollOutcome::Rearm,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status poller lagged behind scan events");
                    self.view.missed_events += skipped;
                }
                Err(TryRecvError::Closed) => return PollOutcome::Done,
            }
        }
    }

    /// Poll on a fixed interval until the scan completes
    ///
    /// `on_update` runs after every poll on the calling task.
    pub async fn run_until_complete<F>(mut self, interval: Duration, mut on_update: F) -> ScanStatusView
    where
        F: FnMut(&ScanStatusView),
    {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let outcome = self.poll();
            on_update(&self.view);
            if outcome == PollOutcome::Done {
                return self.view;
            }
        }
    }
}
