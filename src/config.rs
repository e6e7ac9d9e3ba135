//! Configuration types for regfind
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - The pool and engine settings derived from it

use crate::error::ConfigError;
use crate::search::engine::{
    EngineOptions, Strategy, WeightPolicy, DEFAULT_MAX_IN_FLIGHT, DEFAULT_ROOT_WEIGHT,
};
use crate::search::query::{MatchFlags, Query};
use crate::workers::PoolConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Maximum simultaneous store reads per engine
const MAX_IN_FLIGHT: usize = 1024;

/// Flush interval limits (milliseconds)
const MIN_FLUSH_MS: u64 = 10;
const MAX_FLUSH_MS: u64 = 60_000;

/// Weighted, parallel search of registry snapshots
#[derive(Parser, Debug, Clone)]
#[command(
    name = "regfind",
    version,
    about = "Weighted, parallel search of registry snapshots",
    long_about = "Searches a hierarchical key/value snapshot for key names, value names and value data.\n\n\
                  Subtrees are handed to a pool of worker threads whenever one is idle; \
                  progress is reported as a share of the whole tree.",
    after_help = "EXAMPLES:\n    \
        regfind hklm.json Run\n    \
        regfind hklm.json '^run(once)?$' --regex --exact --root 'HKLM\\Software'\n    \
        regfind hkcu.json dark --data --no-keys -w 8\n    \
        regfind hkcu.json Theme --json -q > matches.jsonl"
)]
pub struct CliArgs {
    /// Snapshot file (JSON key tree)
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Text or regular expression to search for
    #[arg(value_name = "PATTERN")]
    pub pattern: String,

    /// Key to start from (defaults to the snapshot root)
    #[arg(long, value_name = "PATH")]
    pub root: Option<String>,

    /// Treat PATTERN as a regular expression
    #[arg(short = 'e', long)]
    pub regex: bool,

    /// Do not match key names
    #[arg(long)]
    pub no_keys: bool,

    /// Do not match value names
    #[arg(long)]
    pub no_values: bool,

    /// Also match value data
    #[arg(long)]
    pub data: bool,

    /// Case-sensitive matching
    #[arg(short = 'c', long)]
    pub case_sensitive: bool,

    /// Match whole names only
    #[arg(short = 'x', long)]
    pub exact: bool,

    /// Number of worker threads (0 searches in-process only)
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Simultaneous store reads per engine
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT, value_name = "NUM")]
    pub max_in_flight: usize,

    /// Traversal strategy
    #[arg(long, value_enum, default_value_t = Strategy::ParallelDepthFirst)]
    pub strategy: Strategy,

    /// Keep one share of each key's weight for the key itself
    #[arg(long)]
    pub reserve_node_share: bool,

    /// How often progress is flushed, in milliseconds
    #[arg(long, default_value = "1000", value_name = "MS")]
    pub flush_interval_ms: u64,

    /// Total weight of the root key
    #[arg(long, default_value_t = DEFAULT_ROOT_WEIGHT, value_name = "NUM")]
    pub weight: f64,

    /// Simulated store latency per read, in milliseconds
    #[arg(long, value_name = "MS")]
    pub latency_ms: Option<u64>,

    /// Print matches as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// How matches are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One path per line
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Snapshot file to load
    pub snapshot: PathBuf,

    /// Start key; `None` means the snapshot root
    pub root: Option<String>,

    /// Compiled query
    pub query: Query,

    /// Root weight
    pub weight: f64,

    /// Number of worker threads (0 disables delegation)
    pub worker_count: usize,

    /// Engine settings, shared by the orchestrator and the workers
    pub engine: EngineOptions,

    /// Progress flush cadence
    pub flush_interval: Duration,

    /// Simulated store latency
    pub latency: Option<Duration>,

    /// Output format
    pub output: OutputFormat,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl SearchConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if !args.snapshot.is_file() {
            return Err(ConfigError::InvalidSnapshotPath {
                path: args.snapshot.clone(),
                reason: "File does not exist".to_string(),
            });
        }

        if args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.max_in_flight == 0 || args.max_in_flight > MAX_IN_FLIGHT {
            return Err(ConfigError::InvalidInFlightLimit {
                limit: args.max_in_flight,
                max: MAX_IN_FLIGHT,
            });
        }

        if !(MIN_FLUSH_MS..=MAX_FLUSH_MS).contains(&args.flush_interval_ms) {
            return Err(ConfigError::InvalidFlushInterval {
                millis: args.flush_interval_ms,
                min: MIN_FLUSH_MS,
                max: MAX_FLUSH_MS,
            });
        }

        if !args.weight.is_finite() || args.weight <= 0.0 {
            return Err(ConfigError::InvalidWeight {
                weight: args.weight,
            });
        }

        let flags = MatchFlags {
            keys: !args.no_keys,
            values: !args.no_values,
            data: args.data,
            case_sensitive: args.case_sensitive,
            exact: args.exact,
        };
        if !(flags.keys || flags.values || flags.data) {
            return Err(ConfigError::NothingToMatch);
        }

        let query = if args.regex {
            Query::regex(args.pattern, flags)?
        } else {
            Query::literal(args.pattern, flags)
        };

        let weight_policy = if args.reserve_node_share {
            WeightPolicy::ReserveNodeShare
        } else {
            WeightPolicy::SplitAmongChildren
        };

        Ok(Self {
            snapshot: args.snapshot,
            root: args.root,
            query,
            weight: args.weight,
            worker_count: args.workers,
            engine: EngineOptions {
                max_in_flight: args.max_in_flight,
                strategy: args.strategy,
                weight_policy,
            },
            flush_interval: Duration::from_millis(args.flush_interval_ms),
            latency: args.latency_ms.map(Duration::from_millis),
            output: if args.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Worker pool settings; `None` when delegation is disabled
    ///
    /// The breadth-first strategy never delegates, so it gets no pool either.
    pub fn pool_config(&self) -> Option<PoolConfig> {
        if self.worker_count == 0 || self.engine.strategy == Strategy::BreadthFirst {
            return None;
        }
        Some(PoolConfig {
            workers: self.worker_count,
            flush_interval: self.flush_interval,
            engine: self.engine,
        })
    }
}
