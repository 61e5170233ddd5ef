//! Page model extraction
//!
//! Turns the driver's raw per-frame element trees into one indexed
//! [`Snapshot`]. Extraction happens in two phases: an async fetch phase that
//! queries the top document and every reachable frame, and a synchronous
//! build phase that prunes, classifies and indexes the merged tree.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::driver::{BrowserDriver, DriverError, FramePath, RawNode};

use super::classify::{classify, is_pruned_tag, passes_pointer};
use super::fingerprint::{Fingerprint, IdentityTable, fingerprint};
use super::node::{ElementIndex, ElementNode, Snapshot};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Page not stable (document still loading): {url}")]
    Unstable { url: String },

    #[error("Driver error during extraction: {0}")]
    Driver(#[from] DriverError),

    #[error("Driver call timed out after {0:?}")]
    Timeout(Duration),
}

/// Attributes the page script writes for its own bookkeeping
const MARKER_ATTR_PREFIX: &str = "data-wp-";

/// Raw roots of each fetched frame document
type FrameDocuments = HashMap<FramePath, Vec<RawNode>>;

pub struct PageExtractor {
    config: ExtractorConfig,
    identities: IdentityTable,
    generation: u64,
}

impl PageExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            identities: IdentityTable::new(),
            generation: 0,
        }
    }

    /// Generation of the most recent snapshot (0 before the first one)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forget all element identities, e.g. when a new task starts
    pub fn reset(&mut self) {
        debug!(known = self.identities.len(), "Resetting element identity table");
        self.identities.clear();
    }

    /// Capture a snapshot, retrying with exponential back-off while the page is unstable
    pub async fn extract(&mut self, driver: &dyn BrowserDriver) -> Result<Arc<Snapshot>, ExtractionError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(attempt, max_attempts = attempts, "Extracting page model");

            match self.try_extract(driver).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if attempt >= attempts => {
                    warn!(attempt, error = %e, "Extraction failed, giving up");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.config.backoff() * 2u32.saturating_pow(attempt - 1);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Extraction attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_extract(&mut self, driver: &dyn BrowserDriver) -> Result<Arc<Snapshot>, ExtractionError> {
        let state = self.bounded(driver.page_state()).await?;
        if !state.ready {
            return Err(ExtractionError::Unstable { url: state.url });
        }

        let documents = self.fetch_documents(driver).await?;
        let frames = documents.len();
        let nodes = self.build(documents);

        self.generation += 1;
        let snapshot = Snapshot::new(self.generation, state.url, state.title, nodes);

        info!(
            generation = snapshot.generation(),
            url = %snapshot.url(),
            nodes = snapshot.len(),
            interactive = snapshot.interactive().count(),
            frames,
            "Captured page snapshot"
        );

        Ok(Arc::new(snapshot))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DriverError>>,
    ) -> Result<T, ExtractionError> {
        let limit = self.config.query_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ExtractionError::Timeout(limit))?
            .map_err(ExtractionError::from)
    }

    /// Query the top document, then every frame reachable within `max_frame_depth`
    async fn fetch_documents(&self, driver: &dyn BrowserDriver) -> Result<FrameDocuments, ExtractionError> {
        let mut documents = FrameDocuments::new();
        let mut pending = vec![FramePath::root()];

        while let Some(path) = pending.pop() {
            let roots = match self.bounded(driver.query_tree(&path)).await {
                Ok(roots) => roots,
                Err(e) if path.is_root() => return Err(e),
                Err(e) => {
                    warn!(frame = %path, error = %e, "Skipping unreachable frame");
                    continue;
                }
            };

            let roots: Vec<RawNode> = roots.into_iter().filter_map(prune).collect();

            if path.depth() < self.config.max_frame_depth {
                let mut frame_ids = Vec::new();
                for root in &roots {
                    collect_frame_ids(root, &mut frame_ids);
                }
                for id in frame_ids {
                    debug!(parent = %path, frame = %id, "Descending into frame");
                    pending.push(path.child(id));
                }
            }

            documents.insert(path, roots);
        }

        Ok(documents)
    }

    fn build(&mut self, mut documents: FrameDocuments) -> Vec<ElementNode> {
        let roots = documents.remove(&FramePath::root()).unwrap_or_default();

        let mut builder = TreeBuilder {
            identities: &mut self.identities,
            documents,
            occurrences: HashMap::new(),
            nodes: Vec::new(),
            max_nodes: self.config.max_nodes,
            truncated: 0,
        };

        let root_path = FramePath::root();
        let mut ancestors = Vec::new();
        for root in roots {
            builder.visit(root, &root_path, &mut ancestors, None, 0, false);
        }

        if builder.truncated > 0 {
            warn!(
                max_nodes = builder.max_nodes,
                dropped = builder.truncated,
                "Page model truncated at node cap"
            );
        }

        builder.nodes
    }
}

/// Drop non-content subtrees and invisible subtrees with no visible descendants
fn prune(mut node: RawNode) -> Option<RawNode> {
    if is_pruned_tag(&node.tag.to_ascii_lowercase()) {
        return None;
    }

    let children = std::mem::take(&mut node.children);
    node.children = children.into_iter().filter_map(prune).collect();

    if !node.visible && node.children.is_empty() {
        return None;
    }

    Some(node)
}

fn collect_frame_ids(node: &RawNode, out: &mut Vec<String>) {
    if let Some(frame) = &node.frame {
        out.push(frame.id.clone());
    }
    for child in &node.children {
        collect_frame_ids(child, out);
    }
}

struct TreeBuilder<'a> {
    identities: &'a mut IdentityTable,
    documents: FrameDocuments,
    occurrences: HashMap<Fingerprint, usize>,
    nodes: Vec<ElementNode>,
    max_nodes: usize,
    truncated: usize,
}

impl TreeBuilder<'_> {
    fn visit(
        &mut self,
        raw: RawNode,
        frame_path: &FramePath,
        ancestors: &mut Vec<String>,
        parent: Option<ElementIndex>,
        depth: usize,
        inherits_pointer: bool,
    ) {
        if self.nodes.len() >= self.max_nodes {
            self.truncated += 1;
            return;
        }

        let fp = fingerprint(&raw, ancestors, frame_path);
        let occurrence = self.occurrences.entry(fp).or_insert(0);
        let index = self.identities.assign(fp, *occurrence);
        *occurrence += 1;

        let interactivity = classify(&raw, inherits_pointer);
        let child_pointer = passes_pointer(&raw, &interactivity, inherits_pointer);

        let RawNode {
            tag,
            role,
            text,
            attributes,
            rect,
            xpath,
            frame,
            children,
            ..
        } = raw;
        let role = role.or_else(|| attributes.get("role").cloned());
        let mut attributes = attributes;
        attributes.retain(|name, _| !name.starts_with(MARKER_ATTR_PREFIX));

        self.nodes.push(ElementNode {
            index,
            tag: tag.clone(),
            role,
            text,
            rect,
            interactivity,
            frame_path: frame_path.clone(),
            attributes,
            locator: xpath,
            parent,
            depth,
            fingerprint: fp,
        });

        ancestors.push(tag);
        for child in children {
            self.visit(child, frame_path, ancestors, Some(index), depth + 1, child_pointer);
        }
        ancestors.pop();

        if let Some(frame) = frame {
            let inner = frame_path.child(frame.id);
            if let Some(roots) = self.documents.remove(&inner) {
                let mut inner_ancestors = Vec::new();
                for root in roots {
                    self.visit(root, &inner, &mut inner_ancestors, Some(index), depth + 1, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, FakePage, el};

    fn config() -> ExtractorConfig {
        ExtractorConfig {
            backoff_ms: 1,
            ..ExtractorConfig::default()
        }
    }

    fn form_page() -> FakePage {
        FakePage::new("https://shop.test/cart", "Cart").with_roots(vec![
            el("head").invisible().child(el("script").text("var x = 1")),
            el("body")
                .child(el("h1").text("Your cart"))
                .child(el("button").text("Back"))
                .child(el("button").text("Next"))
                .child(el("div").invisible().child(el("span").invisible()))
                .child(el("input").attr("name", "coupon").attr("type", "text")),
        ])
    }

    #[tokio::test]
    async fn test_extract_prunes_and_classifies() {
        let driver = FakeDriver::new(form_page());
        let mut extractor = PageExtractor::new(config());

        let snapshot = extractor.extract(&driver).await.unwrap();
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.url(), "https://shop.test/cart");

        let tags: Vec<&str> = snapshot.nodes().iter().map(|n| n.tag.as_str()).collect();
        assert_eq!(tags, vec!["body", "h1", "button", "button", "input"]);

        let next = snapshot.find_by_text("Next").unwrap();
        assert!(next.interactivity.clickable);
        assert_eq!(next.depth, 1);
        assert_eq!(next.parent, Some(snapshot.nodes()[0].index));

        let coupon = snapshot.nodes().iter().find(|n| n.tag == "input").unwrap();
        assert!(coupon.interactivity.typable);
        assert_eq!(snapshot.interactive().count(), 3);
    }

    #[tokio::test]
    async fn test_reextraction_is_idempotent() {
        let driver = FakeDriver::new(form_page());
        let mut extractor = PageExtractor::new(config());

        let first = extractor.extract(&driver).await.unwrap();
        let second = extractor.extract(&driver).await.unwrap();

        let indices = |s: &Snapshot| s.nodes().iter().map(|n| n.index).collect::<Vec<_>>();
        assert_eq!(indices(&first), indices(&second));
        assert!(second.generation() > first.generation());
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_indices_survive_insertion() {
        let driver = FakeDriver::new(form_page());
        let mut extractor = PageExtractor::new(config());
        let before = extractor.extract(&driver).await.unwrap();
        let next_before = before.find_by_text("Next").unwrap().index;

        driver.set_page(FakePage::new("https://shop.test/cart", "Cart").with_roots(vec![
            el("body")
                .child(el("div").text("Promo banner").attr("role", "alert"))
                .child(el("h1").text("Your cart"))
                .child(el("button").text("Back"))
                .child(el("button").text("Next"))
                .child(el("input").attr("name", "coupon").attr("type", "text")),
        ]));

        let after = extractor.extract(&driver).await.unwrap();
        assert_eq!(after.find_by_text("Next").unwrap().index, next_before);
        let banner = after.find_by_text("Promo banner").unwrap();
        assert!(!before.contains(banner.index));
    }

    #[tokio::test]
    async fn test_duplicate_fingerprints_keep_order() {
        let page = FakePage::new("https://list.test", "List").with_roots(vec![
            el("ul")
                .child(el("li").child(el("a").text("Remove")))
                .child(el("li").child(el("a").text("Remove"))),
        ]);
        let driver = FakeDriver::new(page);
        let mut extractor = PageExtractor::new(config());

        let first = extractor.extract(&driver).await.unwrap();
        let second = extractor.extract(&driver).await.unwrap();

        let removes = |s: &Snapshot| {
            s.nodes()
                .iter()
                .filter(|n| n.text == "Remove")
                .map(|n| n.index)
                .collect::<Vec<_>>()
        };
        let ids = removes(&first);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(ids, removes(&second));
    }

    #[tokio::test]
    async fn test_frames_are_merged_with_paths() {
        let page = FakePage::new("https://pay.test", "Pay")
            .with_roots(vec![
                el("body")
                    .child(el("button").text("Pay now"))
                    .child(el("iframe").frame("card", true)),
            ])
            .with_frame(
                FramePath::root().child("card"),
                vec![el("input").attr("name", "number")],
            );

        let driver = FakeDriver::new(page);
        let mut extractor = PageExtractor::new(config());
        let snapshot = extractor.extract(&driver).await.unwrap();

        let iframe = snapshot.nodes().iter().find(|n| n.tag == "iframe").unwrap();
        let number = snapshot.nodes().iter().find(|n| n.tag == "input").unwrap();
        assert_eq!(number.frame_path, FramePath::root().child("card"));
        assert_eq!(number.parent, Some(iframe.index));
        assert!(number.interactivity.typable);
    }

    #[tokio::test]
    async fn test_frame_marker_attribute_is_ignored() {
        let page = |marked: bool| {
            let mut iframe = el("iframe").attr("name", "checkout").frame("card", true);
            if marked {
                iframe = iframe.attr("data-wp-frame", "f3");
            }
            FakePage::new("https://pay.test", "Pay")
                .with_roots(vec![el("body").child(iframe)])
                .with_frame(FramePath::root().child("card"), vec![el("input").attr("name", "number")])
        };

        let driver = FakeDriver::new(page(false));
        let mut extractor = PageExtractor::new(config());
        let first = extractor.extract(&driver).await.unwrap();
        driver.set_page(page(true));
        let second = extractor.extract(&driver).await.unwrap();

        let iframe = second.nodes().iter().find(|n| n.tag == "iframe").unwrap();
        assert_eq!(iframe.attr("data-wp-frame"), None);
        assert_eq!(iframe.attr("name"), Some("checkout"));
        assert!(crate::history::diff_snapshots(&first, &second).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_frame_is_skipped() {
        let page = FakePage::new("https://ads.test", "Ads").with_roots(vec![
            el("body")
                .child(el("button").text("Close"))
                .child(el("iframe").frame("tracker", true)),
        ]);

        let driver = FakeDriver::new(page);
        let mut extractor = PageExtractor::new(config());
        let snapshot = extractor.extract(&driver).await.unwrap();

        assert!(snapshot.find_by_text("Close").is_some());
        assert!(snapshot.nodes().iter().all(|n| n.frame_path.is_root()));
    }

    #[tokio::test]
    async fn test_frame_depth_limit() {
        let page = FakePage::new("https://nest.test", "Nest")
            .with_roots(vec![el("iframe").frame("outer", false)])
            .with_frame(
                FramePath::root().child("outer"),
                vec![el("iframe").frame("inner", false)],
            )
            .with_frame(
                FramePath::root().child("outer").child("inner"),
                vec![el("button").text("Deep")],
            );

        let driver = FakeDriver::new(page);
        let mut extractor = PageExtractor::new(ExtractorConfig {
            max_frame_depth: 1,
            ..config()
        });
        let snapshot = extractor.extract(&driver).await.unwrap();
        assert!(snapshot.find_by_text("Deep").is_none());
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_node_cap_truncates_preorder() {
        let mut body = el("body");
        for i in 0..10 {
            body = body.child(el("button").text(&format!("b{}", i)));
        }
        let driver = FakeDriver::new(FakePage::new("https://many.test", "Many").with_roots(vec![body]));
        let mut extractor = PageExtractor::new(ExtractorConfig {
            max_nodes: 4,
            ..config()
        });

        let snapshot = extractor.extract(&driver).await.unwrap();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.nodes()[3].text, "b2");
    }

    #[tokio::test]
    async fn test_unstable_page_retries_then_fails() {
        let driver = FakeDriver::new(form_page());
        driver.set_loading(true);
        let mut extractor = PageExtractor::new(config());

        let result = extractor.extract(&driver).await;
        assert!(matches!(result, Err(ExtractionError::Unstable { .. })));
        assert_eq!(driver.page_state_calls(), 3);
        assert_eq!(extractor.generation(), 0);
    }

    #[tokio::test]
    async fn test_recovers_when_page_settles() {
        let driver = FakeDriver::new(form_page());
        driver.fail_next_queries(1);
        let mut extractor = PageExtractor::new(config());

        let snapshot = extractor.extract(&driver).await.unwrap();
        assert!(snapshot.find_by_text("Next").is_some());
        assert_eq!(driver.page_state_calls(), 2);
    }

    #[tokio::test]
    async fn test_reset_forgets_identities() {
        let driver = FakeDriver::new(form_page());
        let mut extractor = PageExtractor::new(config());
        let first = extractor.extract(&driver).await.unwrap();

        driver.set_page(FakePage::new("https://other.test", "Other").with_roots(vec![
            el("body").child(el("a").text("Home")),
        ]));
        extractor.reset();
        let second = extractor.extract(&driver).await.unwrap();

        assert_eq!(second.nodes()[0].index, ElementIndex(0));
        assert!(second.generation() > first.generation());
    }
}
