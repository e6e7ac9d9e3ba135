//! Worker thread logic for delegated subtree searches
//!
//! Each worker:
//! - Runs on its own OS thread with a current-thread tokio runtime
//! - Owns a [`SearchEngine`] with its own read limiter and no pool
//! - Blocks on its request channel for one [`Dispatch`] at a time
//! - Streams buffered progress and matches on a wall-clock interval

use crate::error::WorkerError;
use crate::search::cancel::CancellationToken;
use crate::search::engine::{EngineOptions, SearchEngine, SearchStats};
use crate::search::sink::{ResultItem, Sink};
use crate::store::Store;
use crate::workers::transport::{Dispatch, JobReport, ProgressMessage, WorkerMessage};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct Buffer {
    accumulated: f64,
    found: Vec<ResultItem>,
    last_flush: Instant,
}

/// Sink used inside a worker
///
/// Matches and weight are buffered and sent on the side channel the first
/// time an update arrives after `interval` has passed. Whatever is left at
/// the end goes out through [`finish`](Self::finish).
#[derive(Debug)]
pub struct WorkerSink {
    progress: UnboundedSender<ProgressMessage>,
    interval: Duration,
    buffer: Mutex<Buffer>,
}

impl WorkerSink {
    pub fn new(progress: UnboundedSender<ProgressMessage>, interval: Duration) -> Self {
        Self {
            progress,
            interval,
            buffer: Mutex::new(Buffer {
                accumulated: 0.0,
                found: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Send the remaining weight, close the side channel and hand back the
    /// matches that were never streamed
    pub fn finish(self) -> Vec<ResultItem> {
        let buffer = self.buffer.into_inner();
        if buffer.accumulated > 0.0 {
            // The orchestrator may have stopped listening
            let _ = self.progress.send(ProgressMessage {
                progress_delta: buffer.accumulated,
                found: Vec::new(),
            });
        }
        buffer.found
    }
}

impl Sink for WorkerSink {
    fn update(&self, weight: f64) {
        let message = {
            let mut buffer = self.buffer.lock();
            buffer.accumulated += weight;
            let now = Instant::now();
            if now.duration_since(buffer.last_flush) < self.interval {
                return;
            }
            buffer.last_flush = now;
            ProgressMessage {
                progress_delta: std::mem::take(&mut buffer.accumulated),
                found: std::mem::take(&mut buffer.found),
            }
        };
        let _ = self.progress.send(message);
    }

    fn found(&self, item: ResultItem) {
        self.buffer.lock().found.push(item);
    }
}

/// Everything a worker thread needs
pub(crate) struct WorkerContext {
    pub id: usize,
    pub store: Arc<dyn Store>,
    pub engine: EngineOptions,
    pub flush_interval: Duration,
    pub busy: Arc<AtomicBool>,
    /// Set when the pool shuts down; aborts the job in progress
    pub shutdown: CancellationToken,
}

/// Main worker loop
pub(crate) fn worker_loop(
    ctx: WorkerContext,
    requests: Receiver<WorkerMessage>,
) -> Result<(), WorkerError> {
    let id = ctx.id;
    debug!(worker = id, "Worker starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| WorkerError::InitFailed {
            id,
            reason: e.to_string(),
        })?;

    let engine = SearchEngine::new(Arc::clone(&ctx.store), ctx.engine);
    let mut jobs = 0u64;

    loop {
        let dispatch = match requests.recv() {
            Ok(WorkerMessage::Search(dispatch)) => dispatch,
            Ok(WorkerMessage::Shutdown) => break,
            Err(_) => {
                warn!(worker = id, "Request channel closed");
                break;
            }
        };

        run_job(&ctx, &engine, &runtime, dispatch);
        jobs += 1;
    }

    info!(worker = id, jobs = jobs, "Worker finished");
    Ok(())
}

fn run_job(
    ctx: &WorkerContext,
    engine: &SearchEngine,
    runtime: &tokio::runtime::Runtime,
    dispatch: Dispatch,
) {
    let Dispatch {
        job,
        progress,
        reply,
    } = dispatch;
    debug!(worker = ctx.id, path = %job.path, weight = job.weight, "Job received");

    let sink = WorkerSink::new(progress, ctx.flush_interval);
    let stats = SearchStats::default();
    let result = runtime.block_on(engine.search_subtree(
        &job.path,
        job.weight,
        &job.query,
        &sink,
        &ctx.shutdown,
        &stats,
    ));
    let found = sink.finish();

    let answer = match result {
        Ok(()) => Ok(JobReport {
            found,
            stats: stats.snapshot(),
        }),
        Err(e) => {
            error!(worker = ctx.id, path = %job.path, error = %e, "Job failed");
            Err(WorkerError::SearchFailed {
                id: ctx.id,
                path: job.path,
                reason: e.to_string(),
            })
        }
    };

    // Idle before replying, so the slot can be handed out as soon as the
    // orchestrator releases it
    ctx.busy.store(false, Ordering::Release);
    if reply.send(answer).is_err() {
        debug!(worker = ctx.id, "Reply discarded, caller went away");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_worker_sink_buffers_until_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = WorkerSink::new(tx, Duration::from_secs(3600));

        sink.found(ResultItem::key("a"));
        sink.update(10.0);
        sink.update(5.0);
        assert!(rx.try_recv().is_err());

        let found = sink.finish();
        assert_eq!(found, vec![ResultItem::key("a")]);

        let last = rx.try_recv().unwrap();
        assert_eq!(last.progress_delta, 15.0);
        assert!(last.found.is_empty());
        // Sender dropped by finish
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_worker_sink_streams_after_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = WorkerSink::new(tx, Duration::ZERO);

        sink.found(ResultItem::key("a"));
        sink.update(10.0);

        let message = rx.try_recv().unwrap();
        assert_eq!(message.progress_delta, 10.0);
        assert_eq!(message.found, vec![ResultItem::key("a")]);

        assert!(sink.finish().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
