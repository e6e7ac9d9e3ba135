//! Fixed-capacity pool of worker slots
//!
//! Slots are created once and cycle between the free stack and the callers
//! holding them. [`WorkerPool::get`] never waits: with no idle slot it
//! returns `None` and the caller searches in-process instead.
//!
//! ```text
//!            get()/try_get()                    call(job)
//!  ┌──────────────┐ ───────▶ ┌────────────┐ ─────────────▶ ┌──────────────┐
//!  │  free stack  │          │ WorkerSlot │                │ worker thread│
//!  │  (LIFO)      │ ◀─────── │  (held)    │ ◀── busy=false │  current-    │
//!  └──────────────┘ release()└────────────┘   before reply │  thread rt   │
//!                                                          └──────────────┘
//! ```
//!
//! A slot released while its worker is still busy (the caller gave up on a
//! cancelled search) stays on the stack but is skipped until the worker
//! reports idle.

use crate::error::WorkerError;
use crate::search::cancel::CancellationToken;
use crate::search::engine::EngineOptions;
use crate::search::throttle::DEFAULT_FLUSH_INTERVAL;
use crate::store::Store;
use crate::workers::transport::{PendingCall, SearchJob, WorkerMessage};
use crate::workers::worker::{worker_loop, WorkerContext};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pool construction settings
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of worker threads
    pub workers: usize,
    /// How often a worker streams buffered progress
    pub flush_interval: Duration,
    /// Options for each worker's engine
    pub engine: EngineOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            engine: EngineOptions::default(),
        }
    }
}

/// Handle to one worker thread
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    id: usize,
    requests: Sender<WorkerMessage>,
    busy: Arc<AtomicBool>,
}

impl WorkerSlot {
    pub fn id(&self) -> usize {
        self.id
    }

    /// True while a dispatched call has not been answered
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Dispatch `job` to this slot's worker
    ///
    /// Fails with [`WorkerError::Busy`] if a previous call is still running.
    pub fn call(&self, job: SearchJob) -> Result<PendingCall, WorkerError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(WorkerError::Busy { id: self.id });
        }

        let (call, dispatch) = PendingCall::open(self.id, job);
        if self.requests.send(WorkerMessage::Search(dispatch)).is_err() {
            self.busy.store(false, Ordering::Release);
            return Err(WorkerError::ChannelClosed { id: self.id });
        }
        Ok(call)
    }
}

/// A held slot that goes back to the pool on drop
pub struct SlotLease {
    slot: Option<WorkerSlot>,
    pool: Arc<WorkerPool>,
}

impl SlotLease {
    pub fn id(&self) -> usize {
        self.slot().id()
    }

    pub fn call(&self, job: SearchJob) -> Result<PendingCall, WorkerError> {
        self.slot().call(job)
    }

    fn slot(&self) -> &WorkerSlot {
        // Only `Drop` takes the slot out
        match &self.slot {
            Some(slot) => slot,
            None => unreachable!("slot lease used after release"),
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot);
        }
    }
}

/// Pool of worker threads, each searching one delegated subtree at a time
pub struct WorkerPool {
    /// Released slots, most recent last
    free: Mutex<Vec<WorkerSlot>>,
    senders: Vec<Sender<WorkerMessage>>,
    handles: Mutex<Vec<JoinHandle<Result<(), WorkerError>>>>,
    capacity: usize,
    held: AtomicUsize,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

impl WorkerPool {
    /// Spawn `config.workers` worker threads over `store`
    pub fn new(store: Arc<dyn Store>, config: PoolConfig) -> Result<Arc<Self>, WorkerError> {
        let shutdown = CancellationToken::new();
        let mut slots = Vec::with_capacity(config.workers);
        let mut senders: Vec<Sender<WorkerMessage>> = Vec::with_capacity(config.workers);
        let mut handles = Vec::with_capacity(config.workers);

        for id in 0..config.workers {
            let (tx, rx) = crossbeam_channel::unbounded();
            let busy = Arc::new(AtomicBool::new(false));
            let ctx = WorkerContext {
                id,
                store: Arc::clone(&store),
                engine: config.engine,
                flush_interval: config.flush_interval,
                busy: Arc::clone(&busy),
                shutdown: shutdown.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("regfind-worker-{}", id))
                .spawn(move || worker_loop(ctx, rx));

            let handle = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    // Stop the workers already running
                    for sender in &senders {
                        let _ = sender.send(WorkerMessage::Shutdown);
                    }
                    return Err(WorkerError::InitFailed {
                        id,
                        reason: e.to_string(),
                    });
                }
            };

            slots.push(WorkerSlot {
                id,
                requests: tx.clone(),
                busy,
            });
            senders.push(tx);
            handles.push(handle);
        }

        // Slot 0 on top of the stack
        slots.reverse();
        info!(workers = config.workers, "Worker pool started");

        Ok(Arc::new(Self {
            free: Mutex::new(slots),
            senders,
            handles: Mutex::new(handles),
            capacity: config.workers,
            held: AtomicUsize::new(0),
            shutdown,
            stopped: AtomicBool::new(false),
        }))
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held by callers
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Idle slots that `get` could hand out right now
    pub fn available(&self) -> usize {
        self.free.lock().iter().filter(|s| !s.is_busy()).count()
    }

    /// Take the most recently released idle slot, if any
    pub fn get(&self) -> Option<WorkerSlot> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        let mut free = self.free.lock();
        let index = free.iter().rposition(|s| !s.is_busy())?;
        let slot = free.remove(index);
        self.held.fetch_add(1, Ordering::AcqRel);
        Some(slot)
    }

    /// Return a slot taken with [`get`](Self::get)
    pub fn release(&self, slot: WorkerSlot) {
        self.free.lock().push(slot);
        self.held.fetch_sub(1, Ordering::AcqRel);
    }

    /// [`get`](Self::get), wrapped so the slot is released on drop
    pub fn try_get(self: &Arc<Self>) -> Option<SlotLease> {
        self.get().map(|slot| SlotLease {
            slot: Some(slot),
            pool: Arc::clone(self),
        })
    }

    /// Stop every worker and wait for the threads to exit
    ///
    /// Jobs in progress observe cancellation at their next checkpoint.
    pub fn shutdown(&self) -> Result<(), WorkerError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();
        for sender in &self.senders {
            let _ = sender.send(WorkerMessage::Shutdown);
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let mut first_error = None;
        for (id, handle) in handles.into_iter().enumerate() {
            let result = handle.join().unwrap_or_else(|_| {
                Err(WorkerError::Panicked {
                    id,
                    message: "Worker thread panicked".into(),
                })
            });
            if let Err(e) = result {
                warn!(worker = id, error = %e, "Worker exited with error");
                first_error.get_or_insert(e);
            }
        }

        debug!(workers = self.capacity, "Worker pool stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::Acquire) {
            self.shutdown.cancel();
            for sender in &self.senders {
                let _ = sender.send(WorkerMessage::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::{MatchFlags, Query};
    use crate::search::sink::ResultItem;
    use crate::store::{KeySnapshot, MemoryStore};

    fn store() -> Arc<dyn Store> {
        let tree = KeySnapshot::new("root")
            .with_child(KeySnapshot::new("foo").with_child(KeySnapshot::new("bar")))
            .with_child(KeySnapshot::new("baz"));
        Arc::new(MemoryStore::from_snapshot(tree).unwrap())
    }

    fn pool(workers: usize) -> Arc<WorkerPool> {
        WorkerPool::new(
            store(),
            PoolConfig {
                workers,
                ..PoolConfig::default()
            },
        )
        .unwrap()
    }

    fn job(path: &str) -> SearchJob {
        SearchJob {
            path: path.into(),
            query: Query::literal("ba", MatchFlags::default()),
            weight: 30.0,
        }
    }

    #[test]
    fn test_get_never_exceeds_capacity() {
        let pool = pool(2);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.available(), 2);

        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert!(pool.get().is_none());
        assert_eq!(pool.held(), 2);

        pool.release(b);
        let again = pool.get().unwrap();
        assert_eq!(again.id(), 1);

        pool.release(a);
        pool.release(again);
        assert_eq!(pool.held(), 0);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let pool = pool(1);
        {
            let lease = pool.try_get().unwrap();
            assert_eq!(lease.id(), 0);
            assert!(pool.try_get().is_none());
        }
        assert_eq!(pool.held(), 0);
        assert!(pool.try_get().is_some());
        pool.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_call_runs_subtree() {
        let pool = pool(1);
        let slot = pool.get().unwrap();
        let mut call = slot.call(job(r"root\foo")).unwrap();

        let mut streamed = 0.0;
        let mut found = Vec::new();
        while let Some(message) = call.next_progress().await {
            streamed += message.progress_delta;
            found.extend(message.found);
        }
        let report = call.finish().await.unwrap();
        found.extend(report.found);

        assert_eq!(streamed, 30.0);
        assert_eq!(found, vec![ResultItem::key(r"root\foo\bar")]);
        assert_eq!(report.stats.nodes_visited, 2);
        assert!(!slot.is_busy());

        pool.release(slot);
        pool.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_second_call_on_busy_slot_fails() {
        let slow: Arc<dyn Store> = Arc::new(
            MemoryStore::from_snapshot(KeySnapshot::new("root"))
                .unwrap()
                .with_latency(Duration::from_millis(200)),
        );
        let pool = WorkerPool::new(
            slow,
            PoolConfig {
                workers: 1,
                ..PoolConfig::default()
            },
        )
        .unwrap();
        let slot = pool.get().unwrap();

        let call = slot.call(job("root")).unwrap();
        assert_eq!(
            slot.call(job("root")).unwrap_err(),
            WorkerError::Busy { id: 0 }
        );

        assert!(call.finish().await.is_ok());
        pool.release(slot);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_busy_slot_is_skipped() {
        let pool = pool(2);
        let a = pool.get().unwrap();
        a.busy.store(true, Ordering::Release);
        pool.release(a);

        let b = pool.get().unwrap();
        assert_eq!(b.id(), 1);
        assert!(pool.get().is_none());
        assert_eq!(pool.available(), 0);

        pool.release(b);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = pool(3);
        pool.shutdown().unwrap();
        pool.shutdown().unwrap();
        assert!(pool.get().is_none());
    }
}
