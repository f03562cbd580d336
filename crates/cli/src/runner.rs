//! Opens the configured store and runs one task against it.
//!
//! Labeling is fail-safe: whatever goes wrong, the transaction name is still
//! emitted and the process exits cleanly. Maintenance tasks surface errors.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracelabel_client::RedisStore;
use tracelabel_core::{
    AppConfig, Archiver, ConfigError, Error, Labeler, LogFilter, Profiler, Recorder, SharedStore, SqliteStore,
    StoreBackend, daily_archive_path, delete_matching_lines,
};

use crate::cli::{Command, LabelArgs};

/// Hands the transaction name to the host through stdout.
struct StdoutProfiler;

impl Profiler for StdoutProfiler {
    fn set_transaction_name(&self, name: &str) {
        println!("{name}");
    }
}

/// Open the store selected by `config`.
///
/// Returns `None` when the Redis backend is selected without a host: the
/// host has not opted into instrumentation.
pub async fn open_store(config: &AppConfig) -> Result<Option<Arc<dyn SharedStore>>, Error> {
    match config.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.sqlite_path, config.ttl(), config.timeout()).await?;
            Ok(Some(Arc::new(store)))
        }
        StoreBackend::Redis => {
            if let Err(e) = config.require_redis_host() {
                tracing::debug!(reason = %e, "shared store not configured; skipping task");
                return Ok(None);
            }
            let store = RedisStore::connect(&config.redis, config.ttl(), config.timeout()).await?;
            Ok(Some(Arc::new(store)))
        }
    }
}

async fn close(store: &Arc<dyn SharedStore>) {
    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "store did not close cleanly");
    }
}

/// Dispatch one parsed command.
pub async fn run(command: Command, config: Result<AppConfig, ConfigError>) -> Result<()> {
    match command {
        Command::Label(args) => {
            label(&args, config).await;
            Ok(())
        }
        Command::StripLine { file, line } => {
            let removed = delete_matching_lines(&file, &line);
            println!("{removed}");
            Ok(())
        }
        maintenance => {
            let config = config.context("loading configuration")?;
            let Some(store) = open_store(&config).await.context("opening shared store")? else {
                return Ok(());
            };
            let result = run_maintenance(maintenance, &config, &store).await;
            close(&store).await;
            result
        }
    }
}

async fn label(args: &LabelArgs, config: Result<AppConfig, ConfigError>) {
    let ctx = args.to_context();
    let profiler: Option<Arc<dyn Profiler>> = if args.quiet { None } else { Some(Arc::new(StdoutProfiler)) };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "labeling skipped: configuration invalid");
            return;
        }
    };

    let store = match open_store(&config).await {
        Ok(Some(store)) => store,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "request not recorded");
            if let Some(profiler) = &profiler {
                profiler.set_transaction_name(ctx.fingerprint().as_str());
            }
            return;
        }
    };

    let recorder = Recorder::new(store.clone(), config.tables(), config.max_field_bytes);
    let labeler = match profiler {
        Some(profiler) => Labeler::new(recorder).with_profiler(profiler),
        None => Labeler::new(recorder),
    };
    labeler.label_current_request(&ctx).await;
    close(&store).await;
}

async fn run_maintenance(command: Command, config: &AppConfig, store: &Arc<dyn SharedStore>) -> Result<()> {
    match command {
        Command::Archive { path } => {
            let path = path.unwrap_or_else(|| default_archive_path(config));
            let report = Archiver::new(store.clone(), &config.request_table)
                .with_structured_sibling(config.structured_archive)
                .archive(&path)
                .await
                .with_context(|| format!("archiving to {}", path.display()))?;
            println!("{} {}", report.records, report.path.display());
        }
        Command::RecordDeps { files } => {
            let files = if files.is_empty() { read_stdin_paths()? } else { files };
            let snapshot = Recorder::new(store.clone(), config.tables(), config.max_field_bytes)
                .record_dependency_snapshot(&files)
                .await
                .context("recording dependency snapshot")?;
            println!("{}", snapshot.digest);
        }
        Command::FilterNoise { log } => {
            let report = LogFilter::new(store.clone(), &config.dependency_table)
                .remove_dependency_noise(&log)
                .await
                .context("reading dependency snapshots")?;
            println!("{}", report.removed);
        }
        Command::Label(_) | Command::StripLine { .. } => anyhow::bail!("command does not run against the shared store"),
    }
    Ok(())
}

fn default_archive_path(config: &AppConfig) -> PathBuf {
    daily_archive_path(&config.archive_dir, &config.archive_prefix, chrono::Local::now().date_naive())
}

fn read_stdin_paths() -> Result<Vec<String>> {
    let mut files = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading file list from stdin")?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            files.push(trimmed.to_string());
        }
    }
    Ok(files)
}
