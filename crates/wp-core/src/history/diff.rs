//! Structural diff between two snapshots

use std::collections::HashMap;

use serde::Serialize;

use crate::dom::{ElementIndex, ElementNode, Fingerprint, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<ElementIndex>,
    pub removed: Vec<ElementIndex>,
    /// Same element, different text, attributes, interactivity or geometry
    pub changed: Vec<ElementIndex>,
    /// `(from, to)` when the URL changed
    pub url_change: Option<(String, String)>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && self.url_change.is_none()
    }

    /// `+added -removed ~changed`
    pub fn counts(&self) -> String {
        format!("+{} -{} ~{}", self.added.len(), self.removed.len(), self.changed.len())
    }
}

type Identity = (Fingerprint, usize);

fn identities(snapshot: &Snapshot) -> HashMap<Identity, &ElementNode> {
    let mut seen: HashMap<Fingerprint, usize> = HashMap::new();
    snapshot
        .nodes()
        .iter()
        .map(|node| {
            let occurrence = seen.entry(node.fingerprint).or_insert(0);
            let key = (node.fingerprint, *occurrence);
            *occurrence += 1;
            (key, node)
        })
        .collect()
}

fn node_changed(a: &ElementNode, b: &ElementNode) -> bool {
    a.text != b.text || a.attributes != b.attributes || a.interactivity != b.interactivity || a.rect != b.rect
}

/// Compare two snapshots; results are in `newer`'s (or `older`'s, for removals) pre-order
pub fn diff_snapshots(older: &Snapshot, newer: &Snapshot) -> SnapshotDiff {
    let old_ids = identities(older);
    let new_ids = identities(newer);

    let mut diff = SnapshotDiff::default();
    let mut seen: HashMap<Fingerprint, usize> = HashMap::new();

    for node in newer.nodes() {
        let occurrence = seen.entry(node.fingerprint).or_insert(0);
        let key = (node.fingerprint, *occurrence);
        *occurrence += 1;

        match old_ids.get(&key) {
            None => diff.added.push(node.index),
            Some(old) if node_changed(old, node) => diff.changed.push(node.index),
            Some(_) => {}
        }
    }

    seen.clear();
    for node in older.nodes() {
        let occurrence = seen.entry(node.fingerprint).or_insert(0);
        let key = (node.fingerprint, *occurrence);
        *occurrence += 1;

        if !new_ids.contains_key(&key) {
            diff.removed.push(node.index);
        }
    }

    if older.url() != newer.url() {
        diff.url_change = Some((older.url().to_string(), newer.url().to_string()));
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::dom::PageExtractor;
    use crate::testing::{FakeDriver, FakePage, el};

    #[tokio::test]
    async fn test_diff_added_removed_changed() {
        let driver = FakeDriver::new(FakePage::new("https://a.test", "A").with_roots(vec![
            el("body")
                .child(el("button").text("Save"))
                .child(el("span").text("Draft").attr("id", "status"))
                .child(el("a").text("Help")),
        ]));
        let mut extractor = PageExtractor::new(ExtractorConfig::default());
        let older = extractor.extract(&driver).await.unwrap();

        let mut moved = el("span").text("Draft").attr("id", "status");
        moved = moved.rect(0.0, 300.0, 100.0, 20.0);
        driver.set_page(FakePage::new("https://a.test", "A").with_roots(vec![
            el("body")
                .child(el("button").text("Save"))
                .child(moved)
                .child(el("div").text("Saved!").attr("role", "status")),
        ]));
        let newer = extractor.extract(&driver).await.unwrap();

        let diff = diff_snapshots(&older, &newer);
        assert_eq!(diff.added, vec![newer.find_by_text("Saved!").unwrap().index]);
        assert_eq!(diff.removed, vec![older.find_by_text("Help").unwrap().index]);
        assert_eq!(diff.changed, vec![newer.find_by_text("Draft").unwrap().index]);
        assert!(diff.url_change.is_none());
        assert_eq!(diff.counts(), "+1 -1 ~1");
    }

    #[tokio::test]
    async fn test_identical_snapshots_have_empty_diff() {
        let driver = FakeDriver::new(
            FakePage::new("https://a.test", "A").with_roots(vec![el("button").text("Go")]),
        );
        let mut extractor = PageExtractor::new(ExtractorConfig::default());
        let a = extractor.extract(&driver).await.unwrap();
        let b = extractor.extract(&driver).await.unwrap();
        assert!(diff_snapshots(&a, &b).is_empty());
    }

    #[tokio::test]
    async fn test_url_change() {
        let driver = FakeDriver::new(FakePage::new("https://a.test", "A"));
        let mut extractor = PageExtractor::new(ExtractorConfig::default());
        let a = extractor.extract(&driver).await.unwrap();
        driver.set_page(FakePage::new("https://b.test", "B"));
        let b = extractor.extract(&driver).await.unwrap();

        let diff = diff_snapshots(&a, &b);
        assert_eq!(
            diff.url_change,
            Some(("https://a.test".to_string(), "https://b.test".to_string()))
        );
    }
}
