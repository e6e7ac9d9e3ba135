//! Messages exchanged between an orchestrator and a worker slot
//!
//! ```text
//!  orchestrator                                   worker thread
//!  ────────────                                   ─────────────
//!  WorkerSlot::call ── WorkerMessage::Search ───▶ recv()
//!                                                 search_subtree(...)
//!  PendingCall::next_progress ◀── ProgressMessage (every flush interval)
//!                              ◀── ProgressMessage (remaining weight)
//!                              ◀── side channel closed
//!  PendingCall::finish ◀──────── JobReport (remaining matches)
//! ```
//!
//! The request channel is a crossbeam channel (the worker blocks on it). The
//! side channel and reply are tokio channels so the orchestrator can await
//! them alongside cancellation.

use crate::error::WorkerError;
use crate::search::engine::StatsSnapshot;
use crate::search::query::Query;
use crate::search::sink::ResultItem;
use tokio::sync::{mpsc, oneshot};

/// One delegated subtree
#[derive(Debug, Clone)]
pub struct SearchJob {
    /// Fully qualified path of the subtree root
    pub path: String,
    pub query: Query,
    /// Weight allotted to the subtree
    pub weight: f64,
}

/// Progress streamed while a call is pending
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressMessage {
    pub progress_delta: f64,
    pub found: Vec<ResultItem>,
}

/// Final answer of a successful call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    /// Matches not already streamed
    pub found: Vec<ResultItem>,
    pub stats: StatsSnapshot,
}

pub type JobReply = Result<JobReport, WorkerError>;

/// A call as received by the worker
#[derive(Debug)]
pub struct Dispatch {
    pub job: SearchJob,
    pub progress: mpsc::UnboundedSender<ProgressMessage>,
    pub reply: oneshot::Sender<JobReply>,
}

/// Request channel message
#[derive(Debug)]
pub enum WorkerMessage {
    Search(Dispatch),
    /// Ends the worker loop
    Shutdown,
}

/// Orchestrator side of a dispatched call
///
/// Dropping it abandons the call: the worker finishes on its own and its
/// late messages are discarded.
#[derive(Debug)]
pub struct PendingCall {
    worker: usize,
    path: String,
    progress: mpsc::UnboundedReceiver<ProgressMessage>,
    reply: oneshot::Receiver<JobReply>,
}

impl PendingCall {
    /// Create both ends of a call for `job` on worker `worker`
    pub(crate) fn open(worker: usize, job: SearchJob) -> (Self, Dispatch) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let call = Self {
            worker,
            path: job.path.clone(),
            progress: progress_rx,
            reply: reply_rx,
        };
        let dispatch = Dispatch {
            job,
            progress: progress_tx,
            reply: reply_tx,
        };
        (call, dispatch)
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next streamed message; `None` once the worker closes the side channel
    pub async fn next_progress(&mut self) -> Option<ProgressMessage> {
        self.progress.recv().await
    }

    /// Wait for the final reply
    pub async fn finish(self) -> JobReply {
        self.reply.await.map_err(|_| WorkerError::ReplyDropped {
            id: self.worker,
            path: self.path,
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::MatchFlags;

    fn job() -> SearchJob {
        SearchJob {
            path: r"HKLM\Software".into(),
            query: Query::literal("x", MatchFlags::default()),
            weight: 10.0,
        }
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let (mut call, dispatch) = PendingCall::open(3, job());
        assert_eq!(call.worker(), 3);
        assert_eq!(call.path(), r"HKLM\Software");

        dispatch
            .progress
            .send(ProgressMessage {
                progress_delta: 4.0,
                found: vec![ResultItem::key(r"HKLM\Software\x")],
            })
            .unwrap();
        drop(dispatch.progress);
        dispatch.reply.send(Ok(JobReport::default())).unwrap();

        let first = call.next_progress().await.unwrap();
        assert_eq!(first.progress_delta, 4.0);
        assert!(call.next_progress().await.is_none());
        assert_eq!(call.finish().await, Ok(JobReport::default()));
    }

    #[tokio::test]
    async fn test_dropped_reply() {
        let (call, dispatch) = PendingCall::open(1, job());
        drop(dispatch);

        assert_eq!(
            call.finish().await,
            Err(WorkerError::ReplyDropped {
                id: 1,
                path: r"HKLM\Software".into()
            })
        );
    }
}
