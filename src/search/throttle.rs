//! Debounced delivery of search output to a slow consumer
//!
//! ```text
//!  engine tasks ──update()/found()──▶ ┌──────────┐   every interval   ┌──────────┐
//!                                     │ Pending  │ ─────────────────▶ │ Consumer │
//!  first match ──────── reveal() ───────────────────────────────────▶ │          │
//!                                     └──────────┘   + once on finish └──────────┘
//! ```
//!
//! The engine may call the sink thousands of times a second. The throttle
//! folds those calls into one [`Batch`] per interval so the consumer (a
//! terminal, a UI) only redraws at a steady cadence.

use crate::search::sink::{ResultItem, Sink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default flush cadence
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Most decimal places a percentage is shown with
pub const MAX_PERCENT_PRECISION: usize = 4;

/// Everything accumulated since the previous flush
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Weight completed since the previous batch
    pub progress_delta: f64,
    /// Weight completed since the search started
    pub completed: f64,
    /// Root weight
    pub total: f64,
    pub elapsed: Duration,
    pub found: Vec<ResultItem>,
}

impl Batch {
    /// Completion as a formatted percentage
    pub fn percent(&self) -> String {
        format_percent(self.completed, self.total, self.elapsed)
    }
}

/// Receiver of throttled output
pub trait Consumer: Send + Sync {
    /// Called once per non-empty interval, and once more on finish
    fn deliver(&self, batch: Batch);

    /// Called immediately for the first match of a search
    ///
    /// A revealed item is never repeated in a later [`Batch`]. Must not call
    /// back into the throttle.
    fn reveal(&self, _item: &ResultItem) {}

    /// Consumer-side cancellation, forwarded to the engine
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Fraction of `total` that `completed` represents, as 0..=100
pub fn percent_complete(completed: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 100.0;
    }
    (completed / total * 100.0).clamp(0.0, 100.0)
}

/// Decimal places needed to see movement at `rate` percent per second
///
/// A search crawling at 0.01%/s needs three decimals to visibly advance each
/// second; one racing along at 10%/s needs none.
pub fn percent_precision(rate: f64) -> usize {
    if rate.is_nan() || rate <= 0.0 {
        return MAX_PERCENT_PRECISION;
    }
    let digits = (-rate.log10()).ceil() + 1.0;
    digits.clamp(0.0, MAX_PERCENT_PRECISION as f64) as usize
}

/// Percentage complete, with precision derived from throughput so far
pub fn format_percent(completed: f64, total: f64, elapsed: Duration) -> String {
    let percent = percent_complete(completed, total);
    let secs = elapsed.as_secs_f64();
    let precision = if secs > 0.0 {
        percent_precision(percent / secs)
    } else {
        0
    };
    format!("{:.*}%", precision, percent)
}

#[derive(Debug, Default)]
struct Pending {
    delta: f64,
    completed: f64,
    found: Vec<ResultItem>,
    revealed: bool,
}

/// Sink that batches progress and matches for a [`Consumer`]
pub struct Throttle<C> {
    consumer: C,
    total: f64,
    interval: Duration,
    started: Instant,
    state: Mutex<Pending>,
}

impl<C: Consumer> Throttle<C> {
    /// Throttle for a search of root weight `total`
    pub fn new(consumer: C, total: f64, interval: Duration) -> Self {
        Self {
            consumer,
            total,
            interval,
            started: Instant::now(),
            state: Mutex::new(Pending::default()),
        }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Weight completed so far, delivered or not
    pub fn completed(&self) -> f64 {
        self.state.lock().completed
    }

    /// Deliver whatever is pending; does nothing when nothing is
    pub fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            if state.delta == 0.0 && state.found.is_empty() {
                return;
            }
            Batch {
                progress_delta: std::mem::take(&mut state.delta),
                completed: state.completed,
                total: self.total,
                elapsed: self.started.elapsed(),
                found: std::mem::take(&mut state.found),
            }
        };
        self.consumer.deliver(batch);
    }
}

impl<C: Consumer + 'static> Throttle<C> {
    /// Start the interval flush task on the current runtime
    pub fn spawn(self: &Arc<Self>) -> FlushHandle<C> {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let throttle = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(throttle.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => throttle.flush(),
                }
            }
        });

        FlushHandle {
            throttle: Arc::clone(self),
            stop: Some(stop_tx),
            task,
        }
    }
}

impl<C: Consumer> Sink for Throttle<C> {
    fn update(&self, weight: f64) {
        let mut state = self.state.lock();
        state.delta += weight;
        state.completed += weight;
    }

    fn found(&self, item: ResultItem) {
        let mut state = self.state.lock();
        if state.revealed {
            state.found.push(item);
            return;
        }
        // Held across reveal so no batch can overtake the first match
        state.revealed = true;
        self.consumer.reveal(&item);
    }

    fn is_cancelled(&self) -> bool {
        self.consumer.is_cancelled()
    }
}

/// Running flush task of a [`Throttle`]
pub struct FlushHandle<C: Consumer> {
    throttle: Arc<Throttle<C>>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl<C: Consumer> FlushHandle<C> {
    /// Stop the timer and deliver the final batch
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
        self.throttle.flush();
    }
}

impl<C: Consumer> Drop for FlushHandle<C> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
