//! Run history persistence using SQLite

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::tool::ActionRequest;
use crate::Result;

use super::entry::HistoryEntry;

/// Compact persisted form of a history entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub run_id: String,
    pub step: u32,
    pub action: ActionRequest,
    pub success: bool,
    pub error: Option<String>,
    pub url_before: String,
    pub url_after: Option<String>,
    pub summary: String,
    pub latency_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Insert-only store of run histories
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                run_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                action TEXT NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                url_before TEXT NOT NULL,
                url_after TEXT,
                summary TEXT NOT NULL,
                latency_ms INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (run_id, step)
            )",
            [],
        )?;

        Ok(())
    }

    pub fn append(&self, run_id: &str, entry: &HistoryEntry) -> Result<()> {
        let action_json = serde_json::to_string(&entry.request)?;
        self.conn.execute(
            "INSERT INTO history (run_id, step, action, success, error, url_before, url_after, summary, latency_ms, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                entry.step,
                action_json,
                entry.success(),
                entry.result.error.as_ref().map(|e| e.to_string()),
                entry.url_before(),
                entry.url_after(),
                entry.summary(),
                entry.result.latency.as_millis() as i64,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All records of a run, in step order
    pub fn load_run(&self, run_id: &str) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, step, action, success, error, url_before, url_after, summary, latency_ms, recorded_at
             FROM history WHERE run_id = ?1 ORDER BY step ASC",
        )?;

        let records = stmt
            .query_map(params![run_id], |row| {
                let action_json: String = row.get(2)?;
                let action: ActionRequest =
                    serde_json::from_str(&action_json).map_err(|_| rusqlite::Error::InvalidQuery)?;

                let recorded_at_str: String = row.get(9)?;
                let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc);

                let latency_ms: i64 = row.get(8)?;

                Ok(HistoryRecord {
                    run_id: row.get(0)?,
                    step: row.get(1)?,
                    action,
                    success: row.get(3)?,
                    error: row.get(4)?,
                    url_before: row.get(5)?,
                    url_after: row.get(6)?,
                    summary: row.get(7)?,
                    latency_ms: latency_ms.max(0) as u64,
                    recorded_at,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Distinct run ids, most recent first
    pub fn runs(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id FROM history GROUP BY run_id ORDER BY MAX(recorded_at) DESC",
        )?;
        let runs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryTracker;
    use crate::testing::snapshot_with;
    use crate::tool::{ActionError, ActionResult};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn entry(step: u32, ok: bool) -> HistoryEntry {
        let before = Arc::new(snapshot_with(&[("button", "Next", true)]));
        let result = if ok {
            ActionResult::ok(serde_json::json!({}), Duration::from_millis(12))
        } else {
            ActionResult::failed(ActionError::timeout("slow"), Duration::from_millis(40))
        };
        HistoryEntry::new(step, before, ActionRequest::new("click").param("index", 0), result)
    }

    #[test]
    fn test_append_and_load() {
        let store = HistoryStore::in_memory().unwrap();
        store.append("run-1", &entry(1, true)).unwrap();
        store.append("run-1", &entry(2, false)).unwrap();
        store.append("run-2", &entry(1, true)).unwrap();

        let records = store.load_run("run-1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step, 1);
        assert!(records[0].success);
        assert_eq!(records[0].action.name, "click");
        assert_eq!(records[1].error.as_deref(), Some("Timeout: slow"));
        assert_eq!(records[1].latency_ms, 40);
        assert_eq!(records[1].url_after, None);
    }

    #[test]
    fn test_insert_only() {
        let store = HistoryStore::in_memory().unwrap();
        store.append("run-1", &entry(1, true)).unwrap();
        assert!(store.append("run-1", &entry(1, false)).is_err());
        assert!(store.load_run("run-1").unwrap()[0].success);
    }

    #[test]
    fn test_tracker_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.db");
        let path = path.to_str().unwrap();

        let mut tracker = HistoryTracker::with_store(HistoryStore::new(path).unwrap(), "run-a");
        tracker.record(entry(1, true));
        tracker.record(entry(2, true));
        drop(tracker);

        let reopened = HistoryStore::new(path).unwrap();
        assert_eq!(reopened.load_run("run-a").unwrap().len(), 2);
        assert_eq!(reopened.runs().unwrap(), vec!["run-a".to_string()]);
    }
}
