//! The weighted search engine and its collaborators
//!
//! - `engine`: traversal, weight accounting and delegation
//! - `query`: what a node's names and data are matched against
//! - `sink`: result items and the consumer interface
//! - `throttle`: debounced delivery to a slow consumer
//! - `cancel`: cooperative cancellation token

pub mod cancel;
pub mod engine;
pub mod query;
pub mod sink;
pub mod throttle;

pub use cancel::CancellationToken;
pub use engine::{
    EngineOptions, SearchEngine, SearchStats, SearchSummary, StatsSnapshot, Strategy,
    WeightPolicy, DEFAULT_MAX_IN_FLIGHT, DEFAULT_ROOT_WEIGHT,
};
pub use query::{MatchFlags, Query};
pub use sink::{CollectingSink, ResultItem, Sink, SinkEvent};
pub use throttle::{format_percent, Batch, Consumer, FlushHandle, Throttle, DEFAULT_FLUSH_INTERVAL};
