//! Browser driver boundary
//!
//! The agent never talks to a browser directly. Everything it needs from the
//! page goes through [`BrowserDriver`]: read the document state, query the
//! raw element tree of one frame document, route an input event to an element,
//! take a screenshot.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Ordered list of iframe identifiers from the top document to a frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FramePath(Vec<String>);

impl FramePath {
    /// The top-level document
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of a frame nested directly inside this one
    pub fn child(&self, frame_id: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(frame_id.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "main")
        } else {
            write!(f, "{}", self.0.join(" > "))
        }
    }
}

/// Bounding box in CSS pixels, relative to the top-level viewport
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Reference from an `<iframe>` node to its nested document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFrame {
    pub id: String,
    pub src: Option<String>,
    pub cross_origin: bool,
}

/// One DOM element as reported by the driver, before pruning and indexing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNode {
    pub tag: String,
    pub role: Option<String>,
    /// Direct text of the element, whitespace-collapsed
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub rect: Rect,
    pub visible: bool,
    /// Another element covers the center point
    pub obscured: bool,
    /// Computed `cursor` value
    pub cursor: Option<String>,
    pub editable: bool,
    pub scrollable: bool,
    /// XPath inside the element's own frame document
    pub xpath: String,
    pub frame: Option<RawFrame>,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Document readiness as reported by the driver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    pub title: String,
    /// `document.readyState == "complete"`
    pub ready: bool,
}

/// Input routed to a single element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Click,
    Hover,
    Type { text: String, clear: bool },
    Scroll { dx: f64, dy: f64 },
    Key { key: String },
    Select { value: String },
}

impl InputEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InputEvent::Click => "click",
            InputEvent::Hover => "hover",
            InputEvent::Type { .. } => "type",
            InputEvent::Scroll { .. } => "scroll",
            InputEvent::Key { .. } => "key",
            InputEvent::Select { .. } => "select",
        }
    }
}

/// Where an input event goes: the frame document plus the element locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementTarget {
    pub frame_path: FramePath,
    pub locator: String,
    /// Stable element index, used for logging only
    pub index: u32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("DOM query failed: {0}")]
    Query(String),

    #[error("Input dispatch failed: {0}")]
    Input(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Frame not reachable: {0}")]
    FrameNotFound(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("Browser unavailable: {0}")]
    Unavailable(String),
}

/// Opaque browser capability used by the extractor and the local actions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn page_state(&self) -> Result<PageState, DriverError>;

    /// Raw element tree of one frame document (top-level roots in document order)
    async fn query_tree(&self, frame_path: &FramePath) -> Result<Vec<RawNode>, DriverError>;

    async fn dispatch_input(
        &self,
        target: &ElementTarget,
        event: &InputEvent,
    ) -> Result<(), DriverError>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    async fn go_back(&self) -> Result<(), DriverError>;

    /// Scroll the top-level viewport by `dy` pixels
    async fn scroll_viewport(&self, dy: f64) -> Result<(), DriverError>;

    /// Call the page function `function` with `args` and return its
    /// JSON-encoded result. With a `target` the element is passed as the
    /// first argument. Returned promises are awaited.
    async fn evaluate(
        &self,
        function: &str,
        args: &[JsonValue],
        target: Option<&ElementTarget>,
    ) -> Result<JsonValue, DriverError>;
}
