//! Progress reporting for the command-line search
//!
//! [`ProgressReporter`] is the consumer behind the CLI's [`Throttle`]: it
//! shows a spinner whose message is the completion percentage and prints
//! matches above it, one batch per flush.
//!
//! [`Throttle`]: crate::search::throttle::Throttle

use crate::config::OutputFormat;
use crate::search::engine::SearchSummary;
use crate::search::sink::ResultItem;
use crate::search::throttle::{Batch, Consumer};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Spinner plus match printer
pub struct ProgressReporter {
    /// Progress bar (hidden in quiet mode)
    bar: ProgressBar,

    format: OutputFormat,

    printed: AtomicU64,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new(format: OutputFormat, show_progress: bool) -> Self {
        let bar = if show_progress {
            let bar = ProgressBar::new_spinner();
            if let Ok(template) =
                ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
            {
                bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar.set_message("Searching...");
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            format,
            printed: AtomicU64::new(0),
        }
    }

    /// Matches printed so far
    pub fn printed(&self) -> u64 {
        self.printed.load(Ordering::Relaxed)
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }

    fn print(&self, item: &ResultItem) {
        let line = match self.format {
            OutputFormat::Text => item.to_string(),
            OutputFormat::Json => match serde_json::to_string(item) {
                Ok(line) => line,
                Err(e) => {
                    warn!(item = %item, error = %e, "Failed to encode match");
                    return;
                }
            },
        };
        self.bar.suspend(|| println!("{}", line));
        self.printed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Consumer for ProgressReporter {
    fn deliver(&self, batch: Batch) {
        for item in &batch.found {
            self.print(item);
        }

        self.bar.set_message(format!(
            "{} | Matches: {}",
            batch.percent(),
            format_number(self.printed())
        ));
    }

    fn reveal(&self, item: &ResultItem) {
        self.print(item);
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the search
pub fn print_header(snapshot: &str, root: &str, pattern: &str, workers: usize) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("regfind").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Snapshot:").bold(), snapshot);
    eprintln!("  {} {}", style("Root:").bold(), root);
    eprintln!("  {} {}", style("Pattern:").bold(), pattern);
    eprintln!("  {} {}", style("Workers:").bold(), workers);
    eprintln!();
}

/// Print a summary of the search results
pub fn print_summary(summary: &SearchSummary) {
    let stats = &summary.stats;
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.nodes_visited as f64 / duration_secs
    } else {
        0.0
    };

    eprintln!();
    eprintln!("{}", style("Search Complete").green().bold());
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!(
        "  {} {}",
        style("Keys:").bold(),
        format_number(stats.nodes_visited)
    );
    eprintln!(
        "  {} {}",
        style("Matches:").bold(),
        format_number(stats.matches)
    );
    eprintln!(
        "  {} {:.1}s ({:.0} keys/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.delegated > 0 {
        eprintln!(
            "  {} {}",
            style("Delegated:").bold(),
            format_number(stats.delegated)
        );
    }
    if stats.inaccessible > 0 {
        eprintln!(
            "  {} {}",
            style("Inaccessible:").yellow().bold(),
            format_number(stats.inaccessible)
        );
    }
    if stats.worker_failures > 0 {
        eprintln!(
            "  {} {}",
            style("Worker failures:").red().bold(),
            format_number(stats.worker_failures)
        );
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::sink::Sink;
    use crate::search::throttle::{Throttle, DEFAULT_FLUSH_INTERVAL};

    fn batch(found: Vec<ResultItem>) -> Batch {
        Batch {
            progress_delta: 10.0,
            completed: 10.0,
            total: 100.0,
            elapsed: Duration::from_secs(1),
            found,
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_batches_printed() {
        let reporter = ProgressReporter::new(OutputFormat::Json, false);
        reporter.deliver(batch(vec![
            ResultItem::key("HKLM\\Run"),
            ResultItem::value("HKLM\\Run", "Updater"),
        ]));
        assert_eq!(reporter.printed(), 2);
    }

    #[test]
    fn test_first_match_printed_once_while_flushing() {
        for _ in 0..200 {
            let throttle = Throttle::new(
                ProgressReporter::new(OutputFormat::Text, false),
                100.0,
                DEFAULT_FLUSH_INTERVAL,
            );

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for _ in 0..50 {
                        throttle.flush();
                    }
                });
                scope.spawn(|| throttle.found(ResultItem::key("HKLM\\Run")));
            });
            throttle.flush();

            assert_eq!(throttle.consumer().printed(), 1);
        }
    }
}
