//! CLI entry point for the ads downloader.

use std::path::PathBuf;
use std::sync::Arc;

use ads_downloader_core::config::{self, FileConfig};
use ads_downloader_core::download::PacingPolicy;
use ads_downloader_core::extract;
use ads_downloader_core::settings::Preferences;
use ads_downloader_core::{
    ContentTree, Database, Engine, EngineConfig, HttpClient, HttpTransferService, ResilientStore,
    SettingsStore, SqliteSettingsStore,
};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

mod cli;
mod progress;

use cli::{Cli, CliCommand, DownloadArgs, ScanArgs, SnapshotArgs};
use progress::ProgressObserver;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let file_config = config::load(cli.config.as_deref())?;
    let store = open_store(cli.db.as_ref().or(file_config.db_path.as_ref())).await?;

    match &cli.command {
        CliCommand::Scan(args) => run_scan(args, &file_config, store).await,
        CliCommand::Download(args) => {
            run_download(args, &file_config, store, cli.quiet).await
        }
        CliCommand::Stats(args) => run_stats(args, &file_config, store).await,
    }
}

async fn open_store(db_path: Option<&PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    let Some(path) = db_path else {
        debug!("no settings database, using in-memory settings");
        return Ok(Arc::new(ResilientStore::local_only()));
    };
    let db = Database::new(path)
        .await
        .with_context(|| format!("Failed to open settings database '{}'", path.display()))?;
    let primary = Arc::new(SqliteSettingsStore::new(db));
    Ok(Arc::new(ResilientStore::new(primary)))
}

fn engine_config(args: &SnapshotArgs, file_config: &FileConfig) -> EngineConfig {
    let mut config = EngineConfig::default();
    file_config.apply_to(&mut config);
    if args.include_offscreen {
        config.visible_only = false;
    }
    config
}

fn load_tree(args: &SnapshotArgs) -> Result<ContentTree> {
    ContentTree::load(&args.snapshot, args.viewport)
        .with_context(|| format!("Failed to load snapshot '{}'", args.snapshot.display()))
}

async fn build_engine(
    args: &SnapshotArgs,
    config: EngineConfig,
    store: Arc<dyn SettingsStore>,
    output_dir: PathBuf,
) -> Result<Engine> {
    let service = Arc::new(HttpTransferService::new(HttpClient::new()?, output_dir));
    let mut engine = Engine::new(config, store, service);
    if let Some(today) = args.today {
        engine = engine.with_today(today);
    }
    engine.init().await?;
    Ok(engine)
}

#[derive(Serialize)]
struct ScanLine {
    fingerprint: String,
    #[serde(flatten)]
    metadata: extract::AdMetadata,
    media: Vec<extract::MediaItem>,
    shown: bool,
}

async fn run_scan(args: &ScanArgs, file_config: &FileConfig, store: Arc<dyn SettingsStore>) -> Result<()> {
    let config = engine_config(&args.snapshot, file_config);
    let mut tree = load_tree(&args.snapshot)?;
    let mut engine = build_engine(&args.snapshot, config, store, PathBuf::from(".")).await?;

    let rendered = engine.discover_and_render(&mut tree)?;
    let criteria = args.filter.criteria();
    if !criteria.is_neutral() {
        let outcome = engine.apply_filters(&mut tree, criteria).await?;
        info!(
            matched = outcome.matched_count,
            total = outcome.total_count,
            "filter applied"
        );
    }

    let ctx = engine.extract_context();
    let discovery = engine.discovery();
    for candidate in discovery.discover_all(&tree) {
        let line = ScanLine {
            fingerprint: candidate.fingerprint.to_string(),
            metadata: extract::extract(&tree, candidate.node, &ctx),
            media: discovery.media_of(&tree, &candidate),
            shown: !tree.is_overlay_hidden(candidate.node),
        };
        if args.json {
            println!("{}", serde_json::to_string(&line)?);
        } else if line.shown {
            println!(
                "{}\t{}\t{}\t{}\t{} media\t{}",
                line.metadata.brand,
                line.metadata.date,
                line.metadata.status.as_str(),
                line.fingerprint,
                line.media.len(),
                line.metadata.excerpt
            );
        }
    }
    info!(
        rendered = rendered.rendered.len(),
        deferred = rendered.deferred,
        "scan complete"
    );
    Ok(())
}

async fn run_download(
    args: &DownloadArgs,
    file_config: &FileConfig,
    store: Arc<dyn SettingsStore>,
    quiet: bool,
) -> Result<()> {
    let mut config = engine_config(&args.snapshot, file_config);
    if args.no_delay {
        config.pacing = PacingPolicy::immediate();
    }
    // CLI > config file > saved preferences
    let output_dir = match (&args.output_dir, &file_config.output_dir) {
        (Some(dir), _) | (None, Some(dir)) => dir.clone(),
        (None, None) => PathBuf::from(Preferences::load(store.as_ref()).await.download_location),
    };
    let mut tree = load_tree(&args.snapshot)?;
    let mut engine = build_engine(&args.snapshot, config, store, output_dir.clone()).await?;

    engine.discover_and_render(&mut tree)?;
    let criteria = args.filter.criteria();
    if !criteria.is_neutral() {
        engine.apply_filters(&mut tree, criteria).await?;
    }

    let jobs = engine.plan_downloads(&tree)?;
    let total_items: usize = jobs.iter().map(|job| job.media.len()).sum();
    info!(
        candidates = jobs.len(),
        items = total_items,
        output_dir = %output_dir.display(),
        "Starting downloads"
    );

    let mut observer = ProgressObserver::new(total_items, quiet);
    let report = engine.execute_downloads(jobs, &mut observer).await?;
    observer.finish();

    info!(
        succeeded = report.items_succeeded(),
        failed = report.items_failed(),
        skipped = report.candidates_skipped(),
        download_count = engine.download_count(),
        "Download complete"
    );
    if !quiet {
        println!("{}", report.summary());
    }
    Ok(())
}

async fn run_stats(args: &SnapshotArgs, file_config: &FileConfig, store: Arc<dyn SettingsStore>) -> Result<()> {
    let config = engine_config(args, file_config);
    let tree = load_tree(args)?;
    let engine = build_engine(args, config, store, PathBuf::from(".")).await?;
    let stats = engine.filter_stats(&tree)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
