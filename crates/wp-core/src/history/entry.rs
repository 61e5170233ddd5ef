//! History entries

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::dom::Snapshot;
use crate::tool::{ActionRequest, ActionResult};

use super::diff::{SnapshotDiff, diff_snapshots};

const MAX_PARAMS_CHARS: usize = 120;

/// One executed step. Never mutated after it is recorded.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub step: u32,
    pub before: Arc<Snapshot>,
    pub request: ActionRequest,
    pub result: ActionResult,
    pub after: Option<Arc<Snapshot>>,
    pub diff: Option<SnapshotDiff>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Build an entry; the after-snapshot comes from the result and is diffed against `before`
    pub fn new(step: u32, before: Arc<Snapshot>, request: ActionRequest, result: ActionResult) -> Self {
        let after = result.snapshot.clone();
        let diff = after.as_deref().map(|after| diff_snapshots(&before, after));

        Self {
            step,
            before,
            request,
            result,
            after,
            diff,
            recorded_at: Utc::now(),
        }
    }

    pub fn success(&self) -> bool {
        self.result.success
    }

    pub fn url_before(&self) -> &str {
        self.before.url()
    }

    pub fn url_after(&self) -> Option<&str> {
        self.after.as_deref().map(Snapshot::url)
    }

    /// One line: step, action and parameters, outcome, navigation, diff counts
    pub fn summary(&self) -> String {
        let params = JsonValue::Object(self.request.params.clone()).to_string();
        let params = if params.chars().count() > MAX_PARAMS_CHARS {
            let cut: String = params.chars().take(MAX_PARAMS_CHARS).collect();
            format!("{}...", cut)
        } else {
            params
        };

        let mut line = format!("#{} {} {}", self.step, self.request.name, params);

        match &self.result.error {
            None => line.push_str(" -> ok"),
            Some(err) => line.push_str(&format!(" -> failed ({})", err)),
        }

        if let Some(diff) = &self.diff {
            if let Some((from, to)) = &diff.url_change {
                line.push_str(&format!(" | {} -> {}", from, to));
            }
            line.push_str(&format!(" | {}", diff.counts()));
        }

        line
    }
}
