//! Weighted search engine
//!
//! Walks a store from a root key, reporting matches and progress to a
//! [`Sink`]. Every node carries a weight; a leaf reports its whole weight in a
//! single update, an inner node splits its weight among its children. The
//! updates of a completed search therefore sum to the root weight.
//!
//! # Strategies
//!
//! ```text
//! ParallelDepthFirst                      BreadthFirst
//!
//!        root (100)                       queue: [root]
//!       /    |    \                         pop → scan → push children
//!   33.3   33.3   33.3                      pop → scan → push children
//!    │      │      │                        ...
//!  local  worker  local   ← delegated      one node at a time,
//!    │      │      │        when a slot     in-process only
//!    └──────┴──────┘        is free
//!      join_all barrier
//! ```
//!
//! Store reads run on tokio's blocking pool and are bounded by a per-engine
//! semaphore. A read that fails turns the node into an empty leaf: its weight
//! is still reported and the rest of the tree is searched.

use crate::error::{FinderError, NodeOutcome, Result, StoreError, StoreResult};
use crate::search::cancel::CancellationToken;
use crate::search::query::Query;
use crate::search::sink::{ResultItem, Sink};
use crate::store::{NodeHandle, Store, ValueData};
use crate::workers::{PendingCall, SearchJob, SlotLease, WorkerPool};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, trace, warn};

/// Weight of the root when none is given
pub const DEFAULT_ROOT_WEIGHT: f64 = 100.0;

/// Default bound on simultaneous store reads per engine
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Strategy {
    /// Concurrent fan-out with worker delegation
    #[default]
    #[value(name = "parallel")]
    ParallelDepthFirst,

    /// One queued node at a time, in-process
    #[value(name = "breadth-first")]
    BreadthFirst,
}

/// How an inner node divides its weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightPolicy {
    /// N children get `weight / N` each
    #[default]
    SplitAmongChildren,

    /// The node keeps one share for itself: `weight / (N + 1)` each
    ReserveNodeShare,
}

impl WeightPolicy {
    /// Share given to each of `children` children
    pub fn share(self, weight: f64, children: usize) -> f64 {
        match self {
            WeightPolicy::SplitAmongChildren => weight / children as f64,
            WeightPolicy::ReserveNodeShare => weight / (children + 1) as f64,
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Simultaneous store reads allowed
    pub max_in_flight: usize,
    pub strategy: Strategy,
    pub weight_policy: WeightPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            strategy: Strategy::default(),
            weight_policy: WeightPolicy::default(),
        }
    }
}

/// Counters collected during a search
#[derive(Debug, Default)]
pub struct SearchStats {
    pub nodes_visited: AtomicU64,
    pub inaccessible: AtomicU64,
    pub delegated: AtomicU64,
    pub worker_failures: AtomicU64,
    pub matches: AtomicU64,
}

impl SearchStats {
    pub fn record_node(&self) {
        self.nodes_visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inaccessible(&self) {
        self.inaccessible.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delegated(&self) {
        self.delegated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matches(&self, count: u64) {
        self.matches.fetch_add(count, Ordering::Relaxed);
    }

    /// Fold in counters collected elsewhere (a worker's report)
    pub fn absorb(&self, other: &StatsSnapshot) {
        self.nodes_visited
            .fetch_add(other.nodes_visited, Ordering::Relaxed);
        self.inaccessible
            .fetch_add(other.inaccessible, Ordering::Relaxed);
        self.delegated.fetch_add(other.delegated, Ordering::Relaxed);
        self.worker_failures
            .fetch_add(other.worker_failures, Ordering::Relaxed);
        self.matches.fetch_add(other.matches, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            nodes_visited: self.nodes_visited.load(Ordering::Relaxed),
            inaccessible: self.inaccessible.load(Ordering::Relaxed),
            delegated: self.delegated.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SearchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub nodes_visited: u64,
    pub inaccessible: u64,
    pub delegated: u64,
    pub worker_failures: u64,
    pub matches: u64,
}

/// Result of a completed search
#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub root: String,
    pub weight: f64,
    pub stats: StatsSnapshot,
    pub duration: Duration,
}

/// Per-search state shared by every node of one traversal
#[derive(Clone, Copy)]
struct Visit<'a> {
    query: &'a Query,
    sink: &'a dyn Sink,
    token: &'a CancellationToken,
    stats: &'a SearchStats,
}

impl Visit<'_> {
    fn check(&self) -> Result<()> {
        self.token.check()?;
        if self.sink.is_cancelled() {
            return Err(FinderError::Cancelled);
        }
        Ok(())
    }

    fn found(&self, item: ResultItem) {
        self.stats.record_matches(1);
        self.sink.found(item);
    }
}

/// A subtree handed to a worker slot
struct Delegation {
    lease: SlotLease,
    call: PendingCall,
    weight: f64,
}

/// Search engine over a store
pub struct SearchEngine {
    store: Arc<dyn Store>,
    options: EngineOptions,
    limiter: Semaphore,
    pool: Option<Arc<WorkerPool>>,
}

impl SearchEngine {
    /// Create an engine with its own read limiter
    pub fn new(store: Arc<dyn Store>, options: EngineOptions) -> Self {
        Self {
            store,
            limiter: Semaphore::new(options.max_in_flight.max(1)),
            options,
            pool: None,
        }
    }

    /// Delegate subtrees to `pool` whenever it has a free slot
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Search the tree under `root`
    ///
    /// Fails with [`FinderError::Cancelled`] if the token is set before the
    /// search completes, and with a store error if `root` cannot be resolved.
    pub async fn search(
        &self,
        root: &str,
        weight: f64,
        query: &Query,
        sink: &dyn Sink,
        token: &CancellationToken,
    ) -> Result<SearchSummary> {
        let start = Instant::now();
        let stats = SearchStats::default();
        let visit = Visit {
            query,
            sink,
            token,
            stats: &stats,
        };
        visit.check()?;

        info!(
            root = root,
            pattern = query.pattern(),
            strategy = ?self.options.strategy,
            workers = self.pool.as_ref().map(|p| p.capacity()).unwrap_or(0),
            "Starting search"
        );

        let node = self.resolve(root).await?.map_err(FinderError::Store)?;
        let result = self.run(node, weight, visit).await;

        let summary = SearchSummary {
            root: root.to_string(),
            weight,
            stats: stats.snapshot(),
            duration: start.elapsed(),
        };

        match result {
            Ok(()) => {
                info!(
                    nodes = summary.stats.nodes_visited,
                    matches = summary.stats.matches,
                    inaccessible = summary.stats.inaccessible,
                    delegated = summary.stats.delegated,
                    duration_ms = summary.duration.as_millis() as u64,
                    "Search completed"
                );
                Ok(summary)
            }
            Err(e) => {
                info!(
                    nodes = summary.stats.nodes_visited,
                    error = %e,
                    "Search stopped"
                );
                Err(e)
            }
        }
    }

    /// Search the subtree at `path` on behalf of a worker call
    ///
    /// Unlike [`search`](Self::search), a path that cannot be resolved is an
    /// empty leaf: its weight is reported and the call succeeds.
    pub async fn search_subtree(
        &self,
        path: &str,
        weight: f64,
        query: &Query,
        sink: &dyn Sink,
        token: &CancellationToken,
        stats: &SearchStats,
    ) -> Result<()> {
        let visit = Visit {
            query,
            sink,
            token,
            stats,
        };
        visit.check()?;

        match self.resolve(path).await? {
            Ok(node) => self.run(node, weight, visit).await,
            Err(error) => {
                self.skip_inaccessible(&NodeHandle::new(path, path), error, weight, visit);
                Ok(())
            }
        }
    }

    async fn run(&self, node: NodeHandle, weight: f64, visit: Visit<'_>) -> Result<()> {
        match self.options.strategy {
            Strategy::ParallelDepthFirst => self.traverse(node, weight, visit).await,
            Strategy::BreadthFirst => self.breadth_first(node, weight, visit).await,
        }
    }

    /// Depth-first fan-out; children run concurrently and are joined
    fn traverse<'a>(
        &'a self,
        node: NodeHandle,
        weight: f64,
        visit: Visit<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            visit.check()?;
            visit.stats.record_node();

            if visit.query.matches_key(node.name()) {
                visit.found(ResultItem::key(node.path()));
            }

            if visit.query.scans_values() {
                match self.read(&node, visit, |store, n| store.values(n)).await? {
                    Ok(values) => self.scan_values(&node, &values, visit),
                    Err(error) => {
                        self.skip_inaccessible(&node, error, weight, visit);
                        return Ok(());
                    }
                }
            }

            let children = match self.read(&node, visit, |store, n| store.children(n)).await? {
                Ok(children) => children,
                Err(error) => {
                    self.skip_inaccessible(&node, error, weight, visit);
                    return Ok(());
                }
            };

            if children.is_empty() {
                visit.sink.update(weight);
                return Ok(());
            }

            trace!(
                outcome = ?NodeOutcome::Visited {
                    path: node.path().to_string(),
                    children: children.len(),
                },
                "Node visited"
            );

            let share = self.options.weight_policy.share(weight, children.len());
            if self.options.weight_policy == WeightPolicy::ReserveNodeShare {
                visit.sink.update(share);
            }

            let mut pending: Vec<BoxFuture<'a, Result<()>>> = Vec::with_capacity(children.len());
            for child in children {
                visit.check()?;
                match self.try_delegate(&child, share, visit) {
                    Some(delegation) => pending.push(self.await_delegation(delegation, visit).boxed()),
                    None => pending.push(self.traverse(child, share, visit)),
                }
            }

            // Every child runs to completion (or to its own cancellation
            // checkpoint) before the first error is returned
            let mut outcome = Ok(());
            for result in join_all(pending).await {
                if let Err(e) = result {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
            outcome
        }
        .boxed()
    }

    /// Iterative breadth-first search; each node keeps one share for itself
    async fn breadth_first(&self, root: NodeHandle, weight: f64, visit: Visit<'_>) -> Result<()> {
        let mut queue = VecDeque::from([(root, weight)]);

        while let Some((node, weight)) = queue.pop_front() {
            visit.check()?;
            visit.stats.record_node();

            if visit.query.matches_key(node.name()) {
                visit.found(ResultItem::key(node.path()));
            }

            if visit.query.scans_values() {
                match self.read(&node, visit, |store, n| store.values(n)).await? {
                    Ok(values) => self.scan_values(&node, &values, visit),
                    Err(error) => {
                        self.skip_inaccessible(&node, error, weight, visit);
                        continue;
                    }
                }
            }

            let mut own_share = weight;
            match self.read(&node, visit, |store, n| store.children(n)).await? {
                Ok(children) => {
                    if !children.is_empty() {
                        own_share = WeightPolicy::ReserveNodeShare.share(weight, children.len());
                        queue.extend(children.into_iter().map(|child| (child, own_share)));
                    }
                }
                Err(error) => {
                    self.skip_inaccessible(&node, error, weight, visit);
                    continue;
                }
            }

            visit.sink.update(own_share);
        }

        Ok(())
    }

    fn scan_values(&self, node: &NodeHandle, values: &BTreeMap<String, ValueData>, visit: Visit<'_>) {
        for (name, data) in values {
            if visit.query.matches_value(name, data) {
                visit.found(ResultItem::value(node.path(), name.as_str()));
            }
        }
    }

    /// Treat `node` as an empty leaf after a failed read
    fn skip_inaccessible(&self, node: &NodeHandle, error: StoreError, weight: f64, visit: Visit<'_>) {
        visit.stats.record_inaccessible();
        if error.is_recoverable() {
            debug!(path = node.path(), error = %error, "Key skipped");
        } else {
            warn!(path = node.path(), error = %error, "Key read failed");
        }
        trace!(
            outcome = ?NodeOutcome::Inaccessible {
                path: node.path().to_string(),
                error,
            },
            "Node skipped"
        );
        visit.sink.update(weight);
    }

    /// Run a blocking store read under the limiter
    ///
    /// The outer result carries cancellation (checked once the permit is held
    /// and again after the read); the inner result is the store's answer.
    async fn read<T, F>(&self, node: &NodeHandle, visit: Visit<'_>, op: F) -> Result<StoreResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store, &NodeHandle) -> StoreResult<T> + Send + 'static,
    {
        let permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FinderError::Shutdown)?;
        visit.check()?;

        let store = Arc::clone(&self.store);
        let handle = node.clone();
        let result = tokio::task::spawn_blocking(move || op(store.as_ref(), &handle))
            .await
            .unwrap_or_else(|e| {
                Err(StoreError::Backend {
                    path: node.path().to_string(),
                    reason: format!("store read task failed: {}", e),
                })
            });
        drop(permit);

        visit.check()?;
        Ok(result)
    }

    async fn resolve(&self, path: &str) -> Result<StoreResult<NodeHandle>> {
        let permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FinderError::Shutdown)?;

        let store = Arc::clone(&self.store);
        let owned = path.to_string();
        let result = tokio::task::spawn_blocking(move || store.resolve(&owned))
            .await
            .unwrap_or_else(|e| {
                Err(StoreError::Backend {
                    path: path.to_string(),
                    reason: format!("store resolve task failed: {}", e),
                })
            });
        drop(permit);
        Ok(result)
    }

    /// Hand `child` to a free worker slot, if there is one
    ///
    /// Never waits: with no free slot, or a slot that refuses the call, the
    /// caller recurses in-process instead.
    fn try_delegate(&self, child: &NodeHandle, weight: f64, visit: Visit<'_>) -> Option<Delegation> {
        let pool = self.pool.as_ref()?;
        let lease = pool.try_get()?;

        let job = SearchJob {
            path: child.path().to_string(),
            query: visit.query.clone(),
            weight,
        };

        match lease.call(job) {
            Ok(call) => {
                visit.stats.record_delegated();
                trace!(
                    outcome = ?NodeOutcome::Delegated {
                        path: child.path().to_string(),
                        worker: lease.id(),
                    },
                    "Subtree delegated"
                );
                Some(Delegation {
                    lease,
                    call,
                    weight,
                })
            }
            Err(e) => {
                debug!(worker = lease.id(), path = child.path(), error = %e, "Delegation refused, searching in-process");
                None
            }
        }
    }

    /// Forward a delegated call's streamed progress and final results
    async fn await_delegation(&self, delegation: Delegation, visit: Visit<'_>) -> Result<()> {
        let Delegation {
            lease,
            mut call,
            weight,
        } = delegation;
        let worker = lease.id();
        let mut delivered = 0.0;

        // Dropping the call on cancellation discards whatever the worker
        // still sends; the lease puts the slot back in the free set
        loop {
            let message = tokio::select! {
                biased;
                _ = visit.token.cancelled() => return Err(FinderError::Cancelled),
                message = call.next_progress() => message,
            };
            let Some(message) = message else { break };

            visit.check()?;
            if message.progress_delta > 0.0 {
                delivered += message.progress_delta;
                visit.sink.update(message.progress_delta);
            }
            for item in message.found {
                visit.found(item);
            }
        }

        let path = call.path().to_string();
        let reply = tokio::select! {
            biased;
            _ = visit.token.cancelled() => return Err(FinderError::Cancelled),
            reply = call.finish() => reply,
        };
        visit.check()?;

        match reply {
            Ok(report) => {
                debug!(worker = worker, path = %path, found = report.found.len(), "Delegated subtree completed");
                // Matches are counted as they arrive, streamed or final
                visit.stats.absorb(&StatsSnapshot {
                    matches: 0,
                    ..report.stats
                });
                for item in report.found {
                    visit.found(item);
                }
            }
            Err(e) => {
                warn!(worker = worker, path = %path, error = %e, "Delegated subtree failed");
                visit.stats.record_worker_failure();
                let remaining = weight - delivered;
                if remaining > 0.0 {
                    visit.sink.update(remaining);
                }
            }
        }

        drop(lease);
        Ok(())
    }
}
