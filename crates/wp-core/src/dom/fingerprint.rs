//! Element identity across snapshots

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::driver::{FramePath, RawNode};

use super::node::ElementIndex;

/// Attributes that identify an element independently of layout or state
const STABLE_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "role",
    "aria-label",
    "placeholder",
    "href",
    "title",
    "alt",
    "for",
    "data-testid",
];

const TEXT_PREFIX_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

/// Hash of tag, stable attributes, text prefix, ancestor tag path and frame path
pub fn fingerprint(node: &RawNode, ancestors: &[String], frame_path: &FramePath) -> Fingerprint {
    let mut hasher = DefaultHasher::new();

    frame_path.hash(&mut hasher);
    ancestors.hash(&mut hasher);
    node.tag.hash(&mut hasher);

    for key in STABLE_ATTRIBUTES {
        if let Some(value) = node.attributes.get(*key) {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
    }

    let prefix: String = node.text.chars().take(TEXT_PREFIX_CHARS).collect();
    prefix.hash(&mut hasher);

    Fingerprint(hasher.finish())
}

/// Maps fingerprints to the indices they were given, in first-seen order
#[derive(Debug, Default)]
pub struct IdentityTable {
    slots: HashMap<Fingerprint, Vec<ElementIndex>>,
    next: u32,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for the `occurrence`-th (0-based, pre-order) node with this fingerprint
    pub fn assign(&mut self, fp: Fingerprint, occurrence: usize) -> ElementIndex {
        let slot = self.slots.entry(fp).or_default();
        if let Some(index) = slot.get(occurrence) {
            return *index;
        }

        let index = ElementIndex(self.next);
        self.next += 1;
        slot.push(index);
        index
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tag: &str, text: &str) -> RawNode {
        RawNode {
            tag: tag.to_string(),
            text: text.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_fingerprint_ignores_geometry() {
        let mut a = raw("button", "Next");
        let mut b = raw("button", "Next");
        a.rect.y = 10.0;
        b.rect.y = 900.0;
        b.obscured = true;

        let path = vec!["html".to_string(), "body".to_string()];
        assert_eq!(
            fingerprint(&a, &path, &FramePath::root()),
            fingerprint(&b, &path, &FramePath::root())
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_frames_and_attributes() {
        let node = raw("input", "");
        let path = vec!["form".to_string()];
        let main = fingerprint(&node, &path, &FramePath::root());
        let framed = fingerprint(&node, &path, &FramePath::root().child("pay"));
        assert_ne!(main, framed);

        let mut named = node.clone();
        named.attributes.insert("name".to_string(), "email".to_string());
        assert_ne!(main, fingerprint(&named, &path, &FramePath::root()));

        // volatile attributes do not affect identity
        let mut styled = node.clone();
        styled.attributes.insert("class".to_string(), "focused".to_string());
        assert_eq!(main, fingerprint(&styled, &path, &FramePath::root()));
    }

    #[test]
    fn test_identity_table_reuses_by_occurrence() {
        let mut table = IdentityTable::new();
        let fp = Fingerprint(7);
        let other = Fingerprint(8);

        let first = table.assign(fp, 0);
        let second = table.assign(fp, 1);
        let third = table.assign(other, 0);
        assert_eq!((first.0, second.0, third.0), (0, 1, 2));

        // same page again
        assert_eq!(table.assign(fp, 0), first);
        assert_eq!(table.assign(fp, 1), second);
        assert_eq!(table.assign(other, 0), third);

        // a third duplicate gets a fresh index
        assert_eq!(table.assign(fp, 2), ElementIndex(3));
        assert_eq!(table.len(), 4);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.assign(other, 0), ElementIndex(0));
    }
}
