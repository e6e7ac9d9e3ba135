//! Error types for regfind
//!
//! This module defines the error hierarchy for:
//! - Per-node store failures (recovered locally by the search engine)
//! - Configuration and CLI errors
//! - Worker pool and transport errors
//! - Search-level outcomes such as cancellation
//!
//! Store errors are local to a node: the engine logs them and treats the node
//! as an empty leaf. Only root resolution, configuration problems and
//! cancellation surface as a failed search.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for regfind
#[derive(Error, Debug)]
pub enum FinderError {
    /// Store errors that could not be recovered locally
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool and transport errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (snapshot files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot parse errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The cancellation token was observed set
    #[error("Search cancelled")]
    Cancelled,

    /// The engine's concurrency limiter was closed underneath a search
    #[error("Search limiter closed")]
    Shutdown,
}

impl FinderError {
    /// Returns true if this error is the cancellation outcome
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FinderError::Cancelled)
    }
}

/// Per-node store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The node exists but cannot be read (permissions, locked hive, ...)
    #[error("Access denied: '{path}': {reason}")]
    NotAccessible { path: String, reason: String },

    /// The node does not exist (removed while searching, bad root path)
    #[error("Key not found: '{path}'")]
    NotFound { path: String },

    /// The backend failed for another reason
    #[error("Store backend failed on '{path}': {reason}")]
    Backend { path: String, reason: String },

    /// Two sibling keys share a name, so their paths collide
    #[error("Duplicate key: '{path}'")]
    DuplicateKey { path: String },
}

impl StoreError {
    /// Check if this error is expected during a search and can be skipped quietly
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::NotAccessible { .. } | StoreError::NotFound { .. }
        )
    }

    /// Returns the path associated with this error
    pub fn path(&self) -> &str {
        match self {
            StoreError::NotAccessible { path, .. } => path,
            StoreError::NotFound { path } => path,
            StoreError::Backend { path, .. } => path,
            StoreError::DuplicateKey { path } => path,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be at most {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid in-flight limit
    #[error("Invalid in-flight limit {limit}: must be between 1 and {max}")]
    InvalidInFlightLimit { limit: usize, max: usize },

    /// Invalid flush interval
    #[error("Invalid flush interval {millis}ms: must be between {min}ms and {max}ms")]
    InvalidFlushInterval { millis: u64, min: u64, max: u64 },

    /// Invalid root weight
    #[error("Invalid root weight {weight}: must be a positive finite number")]
    InvalidWeight { weight: f64 },

    /// Pattern failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Nothing to match against
    #[error("Nothing to search: enable at least one of keys, values or data")]
    NothingToMatch,

    /// Snapshot path error
    #[error("Invalid snapshot path '{path}': {reason}")]
    InvalidSnapshotPath { path: PathBuf, reason: String },
}

/// Worker pool and transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// A call was issued on a slot that already has one outstanding
    #[error("Worker {id} is busy: concurrent call not allowed")]
    Busy { id: usize },

    /// The worker's request channel is closed
    #[error("Worker {id} request channel closed")]
    ChannelClosed { id: usize },

    /// The worker dropped the reply without answering
    #[error("Worker {id} dropped the reply for '{path}'")]
    ReplyDropped { id: usize, path: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// The delegated search failed inside the worker
    #[error("Worker {id} search of '{path}' failed: {reason}")]
    SearchFailed {
        id: usize,
        path: String,
        reason: String,
    },
}

/// Result type alias for FinderError
pub type Result<T> = std::result::Result<T, FinderError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Represents the outcome of processing a single node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Node searched in-process
    Visited { path: String, children: usize },

    /// Store read failed; the node was treated as an empty leaf
    Inaccessible { path: String, error: StoreError },

    /// Subtree handed to a worker
    Delegated { path: String, worker: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_recoverable() {
        let denied = StoreError::NotAccessible {
            path: r"HKLM\SAM".into(),
            reason: "access denied".into(),
        };
        assert!(denied.is_recoverable());
        assert_eq!(denied.path(), r"HKLM\SAM");

        let backend = StoreError::Backend {
            path: "HKLM".into(),
            reason: "panicked".into(),
        };
        assert!(!backend.is_recoverable());

        let duplicate = StoreError::DuplicateKey {
            path: r"HKLM\Run".into(),
        };
        assert!(!duplicate.is_recoverable());
        assert_eq!(duplicate.path(), r"HKLM\Run");
    }

    #[test]
    fn test_error_conversion() {
        let store_err = StoreError::NotFound {
            path: r"HKCU\Missing".into(),
        };
        let err: FinderError = store_err.into();
        assert!(matches!(err, FinderError::Store(_)));
        assert!(!err.is_cancelled());
        assert!(FinderError::Cancelled.is_cancelled());
    }
}
