//! Extraction orchestrator
//!
//! Drives one pack scan end to end:
//!
//! 1. Resolve (or create) the pack, clearing it on a forced re-scan
//! 2. Snapshot the classification patterns for this scan
//! 3. Requeue stale `processing` items, discover container files, enqueue them
//! 4. Run a fixed-size pool of workers; each claims one queue item at a time
//!    and runs isolated extraction processes for it
//! 5. Store every extracted asset with its tiers, properties and tags
//! 6. Summarize the pack
//!
//! # Strategy
//! Files up to the large-file threshold are extracted in one whole-file
//! worker run. Larger files go through a quick scan that lists the top-level
//! groups, one run per group (transient errors retried), and a final
//! standalone run for elements outside every group.

use crate::db::{assets, packs, patterns, properties, scan_queue, stats, tags, StoreStats};
use crate::extraction::analysis::{
    analyze_full_file, analyze_single_group, analyze_standalone, top_level_groups, ExtractedAsset,
};
use crate::extraction::{
    run_extraction, ExtractionError, ExtractionHost, ExtractionMode, ExtractionRequest,
    RetryPolicy,
};
use crate::services::classifier::{
    clamp_dimension, classify_all, complexity_bucket, complexity_score, estimated_load_time,
    memory_estimate, quality_tier, size_category, Classification,
};
use crate::services::file_scanner::{DiscoveryError, FileScanner};
use crate::utils::retry_on_lock;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use scenepack_common::config::{ScanConfig, TimeoutConfig, TomlConfig};
use scenepack_common::db::{NewAsset, Pack, PatternSnapshot, PropertyValue, QueueStatus, ScanQueueItem};
use scenepack_common::events::{EventBus, ScanEvent};
use scenepack_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Queue priority for discovered files
const DEFAULT_QUEUE_PRIORITY: i64 = 5;

/// Options for one scan
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Pack name; defaults to the pack directory's name
    pub pack_name: Option<String>,
    /// Delete everything previously stored for the pack first
    pub force_rescan: bool,
    /// Worker pool size; defaults to `[scan] max_workers`
    pub max_workers: Option<usize>,
}

/// Result of a pack scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub pack_info: Pack,
    pub files_queued: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub duration_seconds: f64,
    pub total_assets: i64,
    pub category_breakdown: BTreeMap<String, i64>,
    pub quality_breakdown: BTreeMap<String, i64>,
    pub store_stats: StoreStats,
}

/// Extraction strategy for one container file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    WholeFile,
    Incremental,
}

impl Strategy {
    pub fn for_size(size_bytes: u64, threshold_bytes: u64) -> Self {
        if size_bytes > threshold_bytes {
            Strategy::Incremental
        } else {
            Strategy::WholeFile
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::WholeFile => "whole_file",
            Strategy::Incremental => "incremental",
        }
    }
}

/// Per-scan state shared by all workers
struct ScanRun {
    scan_id: Uuid,
    pack: Pack,
    root: PathBuf,
    patterns: PatternSnapshot,
}

#[derive(Debug, Default)]
struct WorkerTally {
    processed: usize,
    failed: usize,
}

/// Extraction orchestrator service
pub struct Orchestrator {
    pool: SqlitePool,
    host: Arc<dyn ExtractionHost>,
    scan_config: ScanConfig,
    timeouts: TimeoutConfig,
    retry: RetryPolicy,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(
        pool: SqlitePool,
        host: Arc<dyn ExtractionHost>,
        scan_config: ScanConfig,
        timeouts: TimeoutConfig,
        events: EventBus,
    ) -> Self {
        let retry = RetryPolicy::from_config(&scan_config);
        Self {
            pool,
            host,
            scan_config,
            timeouts,
            retry,
            events,
        }
    }

    pub fn from_config(
        pool: SqlitePool,
        host: Arc<dyn ExtractionHost>,
        config: &TomlConfig,
        events: EventBus,
    ) -> Self {
        Self::new(pool, host, config.scan.clone(), config.timeouts.clone(), events)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Scan a pack directory and store every asset found
    ///
    /// A failing container file never fails the scan; it is counted in
    /// `files_failed` once its retry budget is spent.
    pub async fn scan(&self, pack_path: &Path, options: ScanOptions) -> Result<ScanSummary> {
        let started = Instant::now();
        let root = tokio::fs::canonicalize(pack_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("pack path {}", pack_path.display()))
            }
            _ => Error::Io(e),
        })?;

        info!(path = %root.display(), force = options.force_rescan, "Starting pack scan");

        let pack = self.resolve_pack(&root, &options).await?;
        let run = ScanRun {
            scan_id: Uuid::new_v4(),
            patterns: patterns::load_pattern_snapshot(&self.pool).await?,
            pack,
            root,
        };
        debug!(patterns = run.patterns.len(), "Loaded classification pattern snapshot");

        scan_queue::requeue_stale(&self.pool, self.scan_config.stale_after()).await?;

        let files_queued = self.discover_and_enqueue(&run).await?;
        self.events.emit_lossy(ScanEvent::ScanStarted {
            scan_id: run.scan_id,
            pack_id: run.pack.id,
            pack_name: run.pack.name.clone(),
            files_queued,
            timestamp: Utc::now(),
        });

        let worker_count = options
            .max_workers
            .unwrap_or(self.scan_config.max_workers)
            .max(1);

        let mut tally = WorkerTally::default();
        if files_queued == 0 {
            warn!(path = %run.root.display(), "No container files found");
        } else {
            info!(files = files_queued, workers = worker_count, "Processing container files");
            let mut workers: FuturesUnordered<_> = (0..worker_count)
                .map(|n| self.worker_loop(&run, format!("worker-{}", n)))
                .collect();
            while let Some(worker_tally) = workers.next().await {
                tally.processed += worker_tally.processed;
                tally.failed += worker_tally.failed;
            }
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        let summary = self
            .summarize(&run, files_queued, &tally, duration_seconds)
            .await?;

        self.events.emit_lossy(ScanEvent::ScanComplete {
            scan_id: run.scan_id,
            files_processed: summary.files_processed,
            files_failed: summary.files_failed,
            total_assets: summary.total_assets,
            duration_seconds,
            timestamp: Utc::now(),
        });

        info!(
            pack = %summary.pack_info.name,
            processed = summary.files_processed,
            failed = summary.files_failed,
            assets = summary.total_assets,
            duration_seconds,
            "Pack scan complete"
        );
        Ok(summary)
    }

    async fn resolve_pack(&self, root: &Path, options: &ScanOptions) -> Result<Pack> {
        let name = options
            .pack_name
            .clone()
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("cannot derive pack name from {}", root.display())))?;
        let path = root.to_string_lossy().into_owned();

        if let Some(pack) = packs::get_pack_by_name(&self.pool, &name).await? {
            if pack.path != path {
                info!(pack = %name, old = %pack.path, new = %path, "Pack moved, updating path");
                packs::update_pack_path(&self.pool, pack.id, &path).await?;
            }
            if options.force_rescan {
                let removed = packs::clear_pack(&self.pool, pack.id).await?;
                info!(pack = %name, removed, "Force rescan: cleared pack");
            } else {
                info!(pack = %name, pack_id = pack.id, "Using existing pack");
            }
            return packs::get_pack(&self.pool, pack.id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("pack {}", pack.id)));
        }

        let description = format!("Scanned asset pack from {}", root.display());
        let id = packs::create_pack(&self.pool, &name, &path, Some("1.0"), Some(&description)).await?;
        packs::get_pack(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pack {}", id)))
    }

    async fn discover_and_enqueue(&self, run: &ScanRun) -> Result<usize> {
        let scanner = FileScanner::new(
            &self.scan_config.container_extension,
            self.scan_config.min_container_bytes,
            &self.scan_config.skip_dirs,
        );
        let root = run.root.clone();
        let files = tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| Error::Internal(format!("discovery task failed: {}", e)))?
            .map_err(|e| match e {
                DiscoveryError::PathNotFound(p) => Error::NotFound(p.display().to_string()),
                DiscoveryError::NotADirectory(p) => {
                    Error::InvalidInput(format!("not a directory: {}", p.display()))
                }
            })?;

        for file in &files {
            scan_queue::enqueue(
                &self.pool,
                &file.path.to_string_lossy(),
                run.pack.id,
                DEFAULT_QUEUE_PRIORITY,
                self.scan_config.max_file_retries,
            )
            .await?;
        }

        info!(files = files.len(), "Queued container files");
        Ok(files.len())
    }

    async fn worker_loop(&self, run: &ScanRun, worker: String) -> WorkerTally {
        let mut tally = WorkerTally::default();
        let max_wait = self.scan_config.max_lock_wait_ms;

        loop {
            let claimed = retry_on_lock("dequeue_next", max_wait, || {
                scan_queue::dequeue_next(&self.pool, &worker, Some(run.pack.id))
            })
            .await;

            let item = match claimed {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    error!(worker = %worker, error = %e, "Failed to claim queue item, stopping worker");
                    break;
                }
            };

            self.process_item(run, &worker, &item, &mut tally).await;
        }

        debug!(worker = %worker, processed = tally.processed, failed = tally.failed, "Worker finished");
        tally
    }

    async fn process_item(
        &self,
        run: &ScanRun,
        worker: &str,
        item: &ScanQueueItem,
        tally: &mut WorkerTally,
    ) {
        let max_wait = self.scan_config.max_lock_wait_ms;
        let container = PathBuf::from(&item.container_path);

        match self.process_file(run, worker, &container).await {
            Ok(stored) => {
                if let Err(e) = retry_on_lock("complete_item", max_wait, || {
                    scan_queue::complete_item(&self.pool, item.id)
                })
                .await
                {
                    error!(file = %item.container_path, error = %e, "Failed to mark queue item complete");
                }
                tally.processed += 1;
                info!(worker = %worker, file = %item.container_path, assets = stored, "Container file done");
                self.events.emit_lossy(ScanEvent::FileCompleted {
                    scan_id: run.scan_id,
                    worker: worker.to_string(),
                    container_path: item.container_path.clone(),
                    assets_stored: stored,
                });
            }
            Err(e) => {
                let message = e.to_string();
                warn!(worker = %worker, file = %item.container_path, error = %message, "Container file failed");
                self.events.emit_lossy(ScanEvent::FileFailed {
                    scan_id: run.scan_id,
                    worker: worker.to_string(),
                    container_path: item.container_path.clone(),
                    error: message.clone(),
                });

                match retry_on_lock("fail_item", max_wait, || {
                    scan_queue::fail_item(&self.pool, item.id, &message)
                })
                .await
                {
                    Ok(QueueStatus::Failed) => tally.failed += 1,
                    Ok(_) => {}
                    Err(db_error) => {
                        error!(file = %item.container_path, error = %db_error, "Failed to record queue item failure");
                        tally.failed += 1;
                    }
                }
            }
        }
    }

    /// Extract and store one container file; returns the number of assets stored
    async fn process_file(
        &self,
        run: &ScanRun,
        worker: &str,
        container: &Path,
    ) -> std::result::Result<usize, ExtractionError> {
        let size_bytes = tokio::fs::metadata(container).await?.len();
        let strategy = Strategy::for_size(size_bytes, self.scan_config.large_file_threshold_bytes());

        debug!(
            file = %container.display(),
            size_mb = size_bytes as f64 / (1024.0 * 1024.0),
            strategy = strategy.as_str(),
            "Selected extraction strategy"
        );
        self.events.emit_lossy(ScanEvent::FileStarted {
            scan_id: run.scan_id,
            worker: worker.to_string(),
            container_path: container.to_string_lossy().into_owned(),
            strategy: strategy.as_str().to_string(),
        });

        let extracted = match strategy {
            Strategy::WholeFile => self.extract_whole_file(run, container).await?,
            Strategy::Incremental => self.extract_incremental(run, container).await?,
        };

        Ok(self.store_assets(run, container, &extracted).await)
    }

    async fn extract_whole_file(
        &self,
        run: &ScanRun,
        container: &Path,
    ) -> std::result::Result<Vec<ExtractedAsset>, ExtractionError> {
        let request = ExtractionRequest::full_file(run.patterns.clone());
        let timeout = request.mode.timeout(&self.timeouts);
        let report = run_extraction(self.host.as_ref(), container, &request, timeout).await?;
        Ok(analyze_full_file(&report, request.min_element_extent))
    }

    async fn extract_incremental(
        &self,
        run: &ScanRun,
        container: &Path,
    ) -> std::result::Result<Vec<ExtractedAsset>, ExtractionError> {
        let groups = match self.quick_scan(run, container).await {
            Ok(groups) if !groups.is_empty() => groups,
            Ok(_) => {
                info!(file = %container.display(), "No groups found, using whole-file extraction");
                return self.extract_whole_file(run, container).await;
            }
            Err(e) => {
                warn!(file = %container.display(), error = %e, "Quick scan failed, falling back to whole-file extraction");
                return self.extract_whole_file(run, container).await;
            }
        };

        info!(file = %container.display(), groups = groups.len(), "Extracting groups individually");

        let mut extracted = Vec::new();
        for (n, group) in groups.iter().enumerate() {
            debug!(group = %group, index = n + 1, total = groups.len(), "Extracting group");
            let result = self
                .retry
                .run(group, || self.extract_group(run, container, group))
                .await;

            match result {
                Ok(Some(asset)) => extracted.push(asset),
                Ok(None) => debug!(group = %group, "Group has no usable geometry"),
                Err(e) => {
                    warn!(file = %container.display(), group = %group, error = %e, "Group extraction failed");
                    self.events.emit_lossy(ScanEvent::GroupFailed {
                        scan_id: run.scan_id,
                        container_path: container.to_string_lossy().into_owned(),
                        group: group.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        match self.extract_standalone(run, container, &groups).await {
            Ok(standalone) => {
                debug!(count = standalone.len(), "Extracted standalone elements");
                extracted.extend(standalone);
            }
            Err(e) => {
                warn!(file = %container.display(), error = %e, "Standalone extraction failed");
            }
        }

        Ok(extracted)
    }

    async fn quick_scan(
        &self,
        run: &ScanRun,
        container: &Path,
    ) -> std::result::Result<Vec<String>, ExtractionError> {
        let request = ExtractionRequest::quick_scan(run.patterns.clone());
        let timeout = ExtractionMode::QuickScan.timeout(&self.timeouts);
        let report = run_extraction(self.host.as_ref(), container, &request, timeout).await?;
        Ok(top_level_groups(&report))
    }

    async fn extract_group(
        &self,
        run: &ScanRun,
        container: &Path,
        group: &str,
    ) -> std::result::Result<Option<ExtractedAsset>, ExtractionError> {
        let request = ExtractionRequest::single_group(group, run.patterns.clone());
        let timeout = request.mode.timeout(&self.timeouts);
        let report = run_extraction(self.host.as_ref(), container, &request, timeout).await?;
        analyze_single_group(&report, group, request.min_element_extent)
    }

    async fn extract_standalone(
        &self,
        run: &ScanRun,
        container: &Path,
        groups: &[String],
    ) -> std::result::Result<Vec<ExtractedAsset>, ExtractionError> {
        let request = ExtractionRequest::standalone(groups, run.patterns.clone());
        let timeout = request.mode.timeout(&self.timeouts);
        let report = run_extraction(self.host.as_ref(), container, &request, timeout).await?;
        Ok(analyze_standalone(&report, groups, request.min_element_extent))
    }

    /// Persist extracted assets; a failing asset is logged and skipped
    async fn store_assets(&self, run: &ScanRun, container: &Path, extracted: &[ExtractedAsset]) -> usize {
        let relative = container
            .strip_prefix(&run.root)
            .unwrap_or(container)
            .to_string_lossy()
            .into_owned();
        let container_path = container.to_string_lossy().into_owned();

        let mut stored = 0;
        for asset in extracted {
            match self.store_asset(run, &relative, &container_path, asset).await {
                Ok(id) => {
                    stored += 1;
                    debug!(asset_id = id, name = %asset.name, kind = %asset.kind, "Stored asset");
                }
                Err(e) => {
                    error!(name = %asset.name, file = %container_path, error = %e, "Failed to store asset");
                }
            }
        }
        stored
    }

    async fn store_asset(
        &self,
        run: &ScanRun,
        relative_path: &str,
        container_path: &str,
        asset: &ExtractedAsset,
    ) -> Result<i64> {
        let max_wait = self.scan_config.max_lock_wait_ms;
        let classification = classify_all(&asset.name, &run.patterns);
        let new_asset = build_new_asset(run.pack.id, relative_path, container_path, asset, &classification);
        let asset_id = retry_on_lock("create_asset", max_wait, || {
            assets::create_asset(&self.pool, &new_asset)
        })
        .await?;

        let bbox = [
            ("bbox_min", asset.bounds.min),
            ("bbox_max", asset.bounds.max),
        ];
        for (key, point) in bbox {
            let value = PropertyValue::Json(serde_json::json!(point));
            retry_on_lock("set_property", max_wait, || {
                properties::set_property(&self.pool, asset_id, "technical", key, &value)
            })
            .await?;
        }

        for (name, category, confidence) in &asset_tags(&classification, &new_asset) {
            retry_on_lock("add_tag", max_wait, || {
                tags::add_tag(&self.pool, asset_id, name, category, *confidence)
            })
            .await?;
        }

        Ok(asset_id)
    }

    async fn summarize(
        &self,
        run: &ScanRun,
        files_queued: usize,
        tally: &WorkerTally,
        duration_seconds: f64,
    ) -> Result<ScanSummary> {
        let pack_info = packs::get_pack(&self.pool, run.pack.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pack {}", run.pack.id)))?;

        Ok(ScanSummary {
            pack_info,
            files_queued,
            files_processed: tally.processed,
            files_failed: tally.failed,
            duration_seconds,
            total_assets: assets::count_assets(&self.pool, Some(run.pack.id)).await?,
            category_breakdown: assets::category_breakdown(&self.pool, run.pack.id).await?,
            quality_breakdown: assets::quality_breakdown(&self.pool, run.pack.id).await?,
            store_stats: stats::store_stats(&self.pool).await?,
        })
    }
}

/// Denormalized asset row for one extracted asset
pub fn build_new_asset(
    pack_id: i64,
    relative_path: &str,
    container_path: &str,
    asset: &ExtractedAsset,
    classification: &Classification,
) -> NewAsset {
    let dimensions = asset.dimensions().map(clamp_dimension);
    let object_count = asset.object_count.max(1);

    NewAsset {
        name: asset.name.clone(),
        pack_id,
        category: classification.category.label.clone(),
        subcategory: None,
        file_path: relative_path.to_string(),
        container_path: container_path.to_string(),
        resource_kind: asset.kind,
        resource_name: asset.name.clone(),
        polygon_count: asset.polygon_count,
        vertex_count: asset.vertex_count,
        material_count: asset.material_count,
        object_count,
        dimensions,
        complexity_score: complexity_score(asset.polygon_count, object_count),
        quality_tier: quality_tier(asset.polygon_count),
        estimated_load_time: estimated_load_time(asset.polygon_count),
        memory_estimate: memory_estimate(asset.polygon_count),
        primary_style: classification.style.as_ref().map(|s| s.label.clone()),
        size_category: size_category(dimensions[0], dimensions[1], dimensions[2]),
    }
}

/// `(tag, tag_category, confidence)` rows stored alongside an asset
pub fn asset_tags(classification: &Classification, asset: &NewAsset) -> Vec<(String, &'static str, f64)> {
    let mut tags = vec![(
        classification.category.label.clone(),
        "category",
        classification.category.confidence,
    )];
    if let Some(style) = &classification.style {
        tags.push((style.label.clone(), "style", style.confidence));
    }
    if let Some(material) = &classification.material_family {
        tags.push((material.label.clone(), "material_family", material.confidence));
    }
    tags.push((complexity_bucket(asset.complexity_score).to_string(), "complexity", 1.0));
    tags.push((asset.size_category.to_string(), "size", 1.0));
    tags
}
