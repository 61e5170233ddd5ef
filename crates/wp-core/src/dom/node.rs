//! Page model: indexed element nodes and immutable snapshots

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::{FramePath, Rect};

use super::fingerprint::Fingerprint;

/// Stable element index, unique within a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementIndex(pub u32);

impl fmt::Display for ElementIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactivity {
    pub clickable: bool,
    pub typable: bool,
    pub scrollable: bool,
}

impl Interactivity {
    pub fn any(&self) -> bool {
        self.clickable || self.typable || self.scrollable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub index: ElementIndex,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    pub rect: Rect,
    pub interactivity: Interactivity,
    pub frame_path: FramePath,
    pub attributes: BTreeMap<String, String>,
    /// XPath inside `frame_path`'s document
    pub locator: String,
    pub parent: Option<ElementIndex>,
    pub depth: usize,
    pub fingerprint: Fingerprint,
}

impl ElementNode {
    pub fn is_interactive(&self) -> bool {
        self.interactivity.any()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Immutable, indexed view of a page at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    id: Uuid,
    generation: u64,
    captured_at: DateTime<Utc>,
    url: String,
    title: String,
    nodes: Vec<ElementNode>,
    #[serde(skip_serializing)]
    by_index: HashMap<ElementIndex, usize>,
}

impl Snapshot {
    /// `nodes` must be in pre-order with unique indices
    pub fn new(generation: u64, url: impl Into<String>, title: impl Into<String>, nodes: Vec<ElementNode>) -> Self {
        let by_index = nodes
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.index, pos))
            .collect();

        Self {
            id: Uuid::new_v4(),
            generation,
            captured_at: Utc::now(),
            url: url.into(),
            title: title.into(),
            nodes,
            by_index,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// All nodes in pre-order
    pub fn nodes(&self) -> &[ElementNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: ElementIndex) -> Option<&ElementNode> {
        self.by_index.get(&index).map(|&pos| &self.nodes[pos])
    }

    pub fn contains(&self, index: ElementIndex) -> bool {
        self.by_index.contains_key(&index)
    }

    pub fn interactive(&self) -> impl Iterator<Item = &ElementNode> {
        self.nodes.iter().filter(|n| n.is_interactive())
    }

    /// First node whose text contains `needle` (case-insensitive)
    pub fn find_by_text(&self, needle: &str) -> Option<&ElementNode> {
        let needle = needle.to_lowercase();
        self.nodes
            .iter()
            .find(|n| n.text.to_lowercase().contains(&needle))
    }
}
