//! regfind - Weighted, Parallel Registry Search
//!
//! A search engine for large, lazily-enumerated hierarchical key/value stores
//! (registry hives and their snapshots). It matches key names, value names and
//! value data against a query while reporting smooth fractional progress, and
//! hands subtrees to a pool of worker threads whenever one is idle.
//!
//! # Features
//!
//! - **Weighted Progress**: Every key carries a share of the root weight; the
//!   progress updates of a completed search sum exactly to the whole.
//!
//! - **Parallel Delegation**: Idle worker slots take whole subtrees and stream
//!   progress back while they run. A saturated pool never blocks the search,
//!   it simply continues in-process.
//!
//! - **Bounded Store Access**: Blocking store reads run off the async threads,
//!   limited by a per-engine semaphore.
//!
//! - **Cooperative Cancellation**: A token checked at every key and around
//!   every store read.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Store (MemoryStore, ...)                     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ children() / values()
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SearchEngine                              │
//! │   semaphore-bounded reads, weight split, join_all fan-out        │
//! │                                                                  │
//! │        idle slot?  ──yes──▶  ┌─────────────────────────┐         │
//! │            │                 │      WorkerPool          │         │
//! │            no                │  ┌────────┐ ┌────────┐  │         │
//! │            │                 │  │worker 0│ │worker N│  │         │
//! │            ▼                 │  └───┬────┘ └───┬────┘  │         │
//! │     recurse in-process       └──────┼──────────┼───────┘         │
//! │                                     └─progress─┘                 │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ update() / found()
//!                               ▼
//!                    ┌──────────────────┐      ┌──────────────────┐
//!                    │     Throttle     │ ───▶ │     Consumer     │
//!                    │  (1s batches)    │      │ (spinner, stdout)│
//!                    └──────────────────┘      └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Find every key or value named like "Run"
//! regfind hklm.json Run
//!
//! # Regex over value data, eight workers, JSON lines
//! regfind hkcu.json 'dark|light' --regex --data --no-keys -w 8 --json
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod search;
pub mod store;
pub mod workers;

pub use config::{CliArgs, OutputFormat, SearchConfig};
pub use error::{FinderError, Result};
pub use search::{
    CancellationToken, EngineOptions, MatchFlags, Query, ResultItem, SearchEngine, SearchSummary,
    Sink,
};
pub use store::{MemoryStore, Store};
pub use workers::{PoolConfig, WorkerPool};
