//! History tracking: executed steps, snapshot diffs and summaries

mod diff;
mod entry;
mod store;
mod tracker;

pub use diff::{SnapshotDiff, diff_snapshots};
pub use entry::HistoryEntry;
pub use store::{HistoryRecord, HistoryStore};
pub use tracker::HistoryTracker;
