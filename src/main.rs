//! regfind - Weighted, Parallel Registry Search
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use regfind::config::{CliArgs, SearchConfig};
use regfind::error::FinderError;
use regfind::progress::{print_header, print_summary, ProgressReporter};
use regfind::search::{CancellationToken, SearchEngine, Throttle};
use regfind::store::{MemoryStore, Store};
use regfind::workers::WorkerPool;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status after an interrupt
const EXIT_CANCELLED: u8 = 130;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = SearchConfig::from_args(args).context("Invalid configuration")?;

    let mut store = MemoryStore::load(&config.snapshot)
        .with_context(|| format!("Failed to load snapshot '{}'", config.snapshot.display()))?;
    if let Some(latency) = config.latency {
        store = store.with_latency(latency);
    }
    let root = config
        .root
        .clone()
        .unwrap_or_else(|| store.root_path().to_string());
    info!(keys = store.len(), root = %root, "Snapshot loaded");
    let store: Arc<dyn Store> = Arc::new(store);

    let pool = match config.pool_config() {
        Some(pool_config) => Some(
            WorkerPool::new(Arc::clone(&store), pool_config)
                .context("Failed to start worker pool")?,
        ),
        None => None,
    };

    if config.show_progress {
        print_header(
            &config.snapshot.display().to_string(),
            &root,
            config.query.pattern(),
            pool.as_ref().map(|p| p.capacity()).unwrap_or(0),
        );
    }

    // Setup signal handler for cancellation
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, cancelling search...");
        handler_token.cancel();
    })
    .context("Failed to set signal handler")?;

    let mut engine = SearchEngine::new(Arc::clone(&store), config.engine);
    if let Some(pool) = &pool {
        engine = engine.with_pool(Arc::clone(pool));
    }

    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let (result, throttle) = runtime.block_on(async {
        let reporter = ProgressReporter::new(config.output, config.show_progress);
        let throttle = Arc::new(Throttle::new(reporter, config.weight, config.flush_interval));
        let flusher = throttle.spawn();

        let result = engine
            .search(&root, config.weight, &config.query, throttle.as_ref(), &token)
            .await;

        flusher.finish().await;
        (result, throttle)
    });
    throttle.consumer().finish_and_clear();

    if let Some(pool) = pool {
        if let Err(e) = pool.shutdown() {
            warn!(error = %e, "Worker pool did not shut down cleanly");
        }
    }

    match result {
        Ok(summary) => {
            if config.show_progress {
                print_summary(&summary);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(FinderError::Cancelled) => {
            eprintln!("Search cancelled");
            info!(
                printed = throttle.consumer().printed(),
                "Search was interrupted before completion"
            );
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => Err(e).context("Search failed"),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("regfind=debug,warn")
    } else {
        EnvFilter::new("regfind=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
