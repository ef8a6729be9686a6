//! scenepack-indexer - 3D scene pack metadata indexer
//!
//! Scans packs of container files through isolated extraction workers,
//! stores the results, and answers selection queries. Every command prints
//! JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scenepack_common::config::{self, TomlConfig};
use scenepack_common::db::{init_database, Pack, PatternType, QualityTier, SizeCategory};
use scenepack_common::events::EventBus;
use scenepack_indexer::db::{assets, packs, patterns, scan_queue, stats, AssetFilters, TagQuery};
use scenepack_indexer::extraction::ProcessHost;
use scenepack_indexer::services::{Orchestrator, ScanOptions, StatusPoller};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scenepack-indexer")]
#[command(about = "Index 3D scene packs for fast asset selection")]
#[command(version)]
struct Cli {
    /// Data root folder holding the store file
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a pack directory and store its assets
    Scan {
        path: PathBuf,
        /// Pack name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
        /// Delete previously stored assets of the pack first
        #[arg(long)]
        force: bool,
        /// Worker pool size
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Select assets
    Search(SearchArgs),

    /// Inspect or extend classification patterns
    Patterns {
        #[command(subcommand)]
        action: PatternsCommand,
    },

    /// Scan queue status
    Queue {
        /// Restrict to one pack id
        #[arg(long)]
        pack: Option<i64>,
    },

    /// List packs, or retire one pack's assets
    Packs {
        #[command(subcommand)]
        action: Option<PacksCommand>,
    },

    /// Row counts per table
    Stats,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    style: Option<String>,
    /// low, medium, high or ultra
    #[arg(long)]
    quality: Option<QualityTier>,
    /// small, medium, large or huge
    #[arg(long)]
    size: Option<SizeCategory>,
    #[arg(long)]
    max_complexity: Option<f64>,
    #[arg(long)]
    max_polygons: Option<i64>,
    /// Pack id
    #[arg(long)]
    pack: Option<i64>,
    /// Select by tag instead of the denormalized columns (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// With --tag: require every tag
    #[arg(long)]
    all_tags: bool,
    #[arg(long)]
    limit: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum PatternsCommand {
    /// Active patterns of one type, in match order
    List { pattern_type: PatternType },

    /// Add or replace a pattern
    Add {
        pattern_type: PatternType,
        name: String,
        /// Comma-separated keywords
        #[arg(value_delimiter = ',')]
        keywords: Vec<String>,
        #[arg(long, default_value_t = 0.8)]
        confidence: f64,
        #[arg(long, default_value_t = 5)]
        priority: i64,
    },

    /// Re-enable a pattern
    Enable { pattern_type: PatternType, name: String },

    /// Disable a pattern without deleting it
    Disable { pattern_type: PatternType, name: String },
}

#[derive(Subcommand, Debug)]
enum PacksCommand {
    /// All packs (default)
    List,

    /// Hide every asset of a pack from selection, keeping the rows
    Deactivate { name: String },

    /// Delete every asset, tag, property and queue item of a pack
    Clear { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root = config::resolve_root_folder(cli.root.as_deref(), &config);
    let db_path = config::database_path(&root, &config);
    debug!(root = %root.display(), database = %db_path.display(), "Resolved store location");

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open store {}", db_path.display()))?;

    match cli.command {
        Command::Scan {
            path,
            name,
            force,
            workers,
        } => {
            let options = ScanOptions {
                pack_name: name,
                force_rescan: force,
                max_workers: workers,
            };
            run_scan(pool, &config, &path, options).await
        }
        Command::Search(args) => run_search(&pool, args).await,
        Command::Patterns { action } => run_patterns(&pool, action).await,
        Command::Queue { pack } => {
            let counts = scan_queue::queue_status_counts(&pool, pack).await?;
            print_json(&counts)
        }
        Command::Packs { action } => run_packs(&pool, action.unwrap_or(PacksCommand::List)).await,
        Command::Stats => print_json(&stats::store_stats(&pool).await?),
    }
}

async fn run_scan(pool: SqlitePool, config: &TomlConfig, path: &Path, options: ScanOptions) -> Result<()> {
    let host = ProcessHost::from_config(&config.host);
    info!(host = %host.executable().display(), "Using extraction host");

    let events = EventBus::default();
    let poller = StatusPoller::new(&events);
    let orchestrator = Orchestrator::from_config(pool, Arc::new(host), config, events);

    let progress = tokio::spawn(poller.run_until_complete(Duration::from_millis(500), |view| {
        if !view.complete && view.files_queued > 0 {
            info!(
                completed = view.files_completed,
                queued = view.files_queued,
                failed_attempts = view.failed_attempts,
                "Scan progress"
            );
        }
    }));

    let summary = orchestrator
        .scan(path, options)
        .await
        .with_context(|| format!("Scan of {} failed", path.display()))?;
    progress.abort();

    print_json(&summary)
}

async fn run_search(pool: &SqlitePool, args: SearchArgs) -> Result<()> {
    let found = if args.tags.is_empty() {
        let filters = AssetFilters {
            category: args.category,
            style: args.style,
            quality_tier: args.quality,
            size_category: args.size,
            max_complexity: args.max_complexity,
            max_polygons: args.max_polygons,
            pack_id: args.pack,
            limit: args.limit,
        };
        assets::search(pool, &filters).await?
    } else {
        let query = TagQuery {
            tags: args.tags,
            tag_category: None,
            match_all: args.all_tags,
            pack_id: args.pack,
            limit: args.limit,
        };
        assets::search_by_tag(pool, &query).await?
    };

    print_json(&found)
}

async fn run_patterns(pool: &SqlitePool, action: PatternsCommand) -> Result<()> {
    match action {
        PatternsCommand::List { pattern_type } => {
            print_json(&patterns::get_classification_patterns(pool, pattern_type).await?)
        }
        PatternsCommand::Add {
            pattern_type,
            name,
            keywords,
            confidence,
            priority,
        } => {
            patterns::add_classification_pattern(pool, pattern_type, &name, &keywords, confidence, priority)
                .await
                .with_context(|| format!("Failed to add pattern {}", name))?;
            print_json(&patterns::get_classification_patterns(pool, pattern_type).await?)
        }
        PatternsCommand::Enable { pattern_type, name } => {
            patterns::set_pattern_active(pool, pattern_type, &name, true).await?;
            print_json(&serde_json::json!({ "pattern_type": pattern_type, "name": name, "active": true }))
        }
        PatternsCommand::Disable { pattern_type, name } => {
            patterns::set_pattern_active(pool, pattern_type, &name, false).await?;
            print_json(&serde_json::json!({ "pattern_type": pattern_type, "name": name, "active": false }))
        }
    }
}

async fn pack_named(pool: &SqlitePool, name: &str) -> Result<Pack> {
    packs::get_pack_by_name(pool, name)
        .await?
        .with_context(|| format!("No pack named {}", name))
}

async fn run_packs(pool: &SqlitePool, action: PacksCommand) -> Result<()> {
    match action {
        PacksCommand::List => print_json(&packs::list_packs(pool).await?),
        PacksCommand::Deactivate { name } => {
            let pack = pack_named(pool, &name).await?;
            let deactivated = assets::deactivate_pack_assets(pool, pack.id).await?;
            print_json(&serde_json::json!({ "pack": pack.name, "assets_deactivated": deactivated }))
        }
        PacksCommand::Clear { name } => {
            let pack = pack_named(pool, &name).await?;
            let removed = packs::clear_pack(pool, pack.id).await?;
            print_json(&serde_json::json!({ "pack": pack.name, "assets_removed": removed }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
