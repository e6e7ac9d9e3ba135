//! Result types and the consumer interface of a search
//!
//! The engine reports two things to a [`Sink`]: progress increments, whose sum
//! over a completed search equals the root weight, and [`ResultItem`]s.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// A single match
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultItem {
    /// A key whose name matched
    KeyMatch { path: String },

    /// A value whose name or data matched
    ValueMatch { path: String, value_name: String },
}

impl ResultItem {
    /// Key match at `path`
    pub fn key(path: impl Into<String>) -> Self {
        ResultItem::KeyMatch { path: path.into() }
    }

    /// Value match for `value_name` under `path`
    pub fn value(path: impl Into<String>, value_name: impl Into<String>) -> Self {
        ResultItem::ValueMatch {
            path: path.into(),
            value_name: value_name.into(),
        }
    }

    /// Path of the key the match belongs to
    pub fn path(&self) -> &str {
        match self {
            ResultItem::KeyMatch { path } => path,
            ResultItem::ValueMatch { path, .. } => path,
        }
    }
}

impl fmt::Display for ResultItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultItem::KeyMatch { path } => f.write_str(path),
            ResultItem::ValueMatch { path, value_name } => write!(f, "{}@{}", path, value_name),
        }
    }
}

/// Receives progress and matches from a search
///
/// Called concurrently from the traversal's tasks, hence `&self`.
pub trait Sink: Send + Sync {
    /// Add `weight` to the completed share
    fn update(&self, weight: f64);

    /// Report a match
    fn found(&self, item: ResultItem);

    /// Consumer-side cancellation, checked alongside the search token
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Sink that records everything it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<SinkEvent>>,
}

/// One call received by a [`CollectingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Update(f64),
    Found(ResultItem),
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call, in arrival order
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Matches, in arrival order
    pub fn items(&self) -> Vec<ResultItem> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Found(item) => Some(item.clone()),
                SinkEvent::Update(_) => None,
            })
            .collect()
    }

    /// Progress increments, in arrival order
    pub fn updates(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Update(w) => Some(*w),
                SinkEvent::Found(_) => None,
            })
            .collect()
    }

    /// Sum of all progress increments
    pub fn total_weight(&self) -> f64 {
        self.updates().iter().sum()
    }
}

impl Sink for CollectingSink {
    fn update(&self, weight: f64) {
        self.events.lock().push(SinkEvent::Update(weight));
    }

    fn found(&self, item: ResultItem) {
        self.events.lock().push(SinkEvent::Found(item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_display() {
        assert_eq!(ResultItem::key(r"HKLM\Run").to_string(), r"HKLM\Run");
        assert_eq!(
            ResultItem::value(r"HKLM\Run", "Updater").to_string(),
            r"HKLM\Run@Updater"
        );
    }

    #[test]
    fn test_result_json() {
        let json = serde_json::to_string(&ResultItem::value("HKCU", "Theme")).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"value_match","path":"HKCU","value_name":"Theme"}"#
        );
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.update(25.0);
        sink.found(ResultItem::key("HKCU"));
        sink.update(75.0);

        assert_eq!(sink.updates(), vec![25.0, 75.0]);
        assert_eq!(sink.items(), vec![ResultItem::key("HKCU")]);
        assert_eq!(sink.total_weight(), 100.0);
        assert_eq!(sink.events().len(), 3);
    }
}
