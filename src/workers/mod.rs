//! Delegation of subtrees to parallel workers
//!
//! - `pool`: fixed-capacity slot pool with a LIFO free stack
//! - `worker`: the worker thread loop and its buffering sink
//! - `transport`: request, side channel and reply messages

pub mod pool;
pub mod transport;
pub mod worker;

pub use pool::{PoolConfig, SlotLease, WorkerPool, WorkerSlot};
pub use transport::{JobReply, JobReport, PendingCall, ProgressMessage, SearchJob};
pub use worker::WorkerSink;
