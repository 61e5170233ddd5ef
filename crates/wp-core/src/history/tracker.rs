//! Append-only run history

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dom::Snapshot;

use super::diff::{SnapshotDiff, diff_snapshots};
use super::entry::HistoryEntry;
use super::store::HistoryStore;

/// Every executed step of one run, in order
pub struct HistoryTracker {
    entries: Vec<Arc<HistoryEntry>>,
    store: Option<(HistoryStore, String)>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            store: None,
        }
    }

    /// Also persist each recorded entry under `run_id`
    pub fn with_store(store: HistoryStore, run_id: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            store: Some((store, run_id.into())),
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) -> Arc<HistoryEntry> {
        let entry = Arc::new(entry);
        debug!(step = entry.step, action = %entry.request.name, success = entry.success(), "Recorded history entry");

        if let Some((store, run_id)) = &self.store {
            if let Err(e) = store.append(run_id, &entry) {
                warn!(run_id = %run_id, step = entry.step, error = %e, "Failed to persist history entry");
            }
        }

        self.entries.push(Arc::clone(&entry));
        entry
    }

    pub fn entries(&self) -> &[Arc<HistoryEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Arc<HistoryEntry>> {
        self.entries.last()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.success()).count()
    }

    pub fn diff(&self, older: &Snapshot, newer: &Snapshot) -> SnapshotDiff {
        diff_snapshots(older, newer)
    }

    /// Recorded entries and the store, if any, for reuse in a later run
    pub fn into_parts(self) -> (Vec<Arc<HistoryEntry>>, Option<HistoryStore>) {
        (self.entries, self.store.map(|(store, _)| store))
    }

    /// One line per entry in `range` (clamped to the recorded entries)
    pub fn summarize(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.entries.len());
        let start = range.start.min(end);

        self.entries[start..end]
            .iter()
            .map(|e| e.summary())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{snapshot_at, snapshot_with};
    use crate::tool::{ActionError, ActionRequest, ActionResult};
    use serde_json::json;
    use std::time::Duration;

    fn click(step: u32, ok: bool) -> HistoryEntry {
        let before = Arc::new(snapshot_with(&[("button", "Next", true)]));
        let result = if ok {
            ActionResult::ok(json!({"clicked": 0}), Duration::from_millis(3))
        } else {
            ActionResult::failed(ActionError::browser("element detached"), Duration::from_millis(3))
        };
        HistoryEntry::new(step, before, ActionRequest::new("click").param("index", 0), result)
    }

    #[test]
    fn test_record_and_counts() {
        let mut tracker = HistoryTracker::new();
        let first = tracker.record(click(1, true));
        tracker.record(click(2, false));
        tracker.record(click(3, true));

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.success_count(), 2);
        assert_eq!(tracker.last().unwrap().step, 3);
        assert!(Arc::ptr_eq(&first, &tracker.entries()[0]));
    }

    #[test]
    fn test_summary_lines() {
        let mut tracker = HistoryTracker::new();
        tracker.record(click(1, true));
        tracker.record(click(2, false));

        let summary = tracker.summarize(0..10);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "#1 click {\"index\":0} -> ok");
        assert_eq!(lines[1], "#2 click {\"index\":0} -> failed (Browser: element detached)");

        assert_eq!(tracker.summarize(1..2), lines[1]);
        assert_eq!(tracker.summarize(5..9), "");
    }

    #[test]
    fn test_summary_includes_navigation_without_tree() {
        let before = Arc::new(snapshot_at("https://a.test/cart", &[("button", "Checkout", true)]));
        let after = Arc::new(snapshot_at("https://a.test/pay", &[("input", "", true)]));
        let result = ActionResult::ok(json!(null), Duration::from_millis(8)).with_snapshot(after);

        let entry = HistoryEntry::new(4, before, ActionRequest::new("click").param("index", 0), result);
        let line = entry.summary();
        assert!(line.contains("https://a.test/cart -> https://a.test/pay"), "{}", line);
        assert!(!line.contains("Checkout"));
        assert_eq!(entry.url_after(), Some("https://a.test/pay"));
    }
}
