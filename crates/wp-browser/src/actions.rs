//! Built-in local browser actions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use wp_core::config::BrowserConfig;
use wp_core::dom::{ElementNode, Snapshot};
use wp_core::driver::InputEvent;
use wp_core::tool::{
    ActionError, ActionPage, ActionSpec, BrowserAction, CapabilityRegistry, JsonMap, ParamKind, ParamSpec,
    Predicate, RegistryError, SideEffect, param_bool, param_i64, param_str,
};

/// Longest text returned by `extract_text`
const MAX_EXTRACT_CHARS: usize = 4000;

const MAX_SCRIPT_CHARS: usize = 4000;

/// Condition used by `wait_for_function` when no script is given
const DOCUMENT_LOADED: &str = "() => document.readyState === 'complete'";

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WAIT_MS: i64 = 5_000;
const MAX_WAIT_MS: i64 = 30_000;

fn element_param() -> ParamSpec {
    ParamSpec::new("index", ParamKind::ElementIndex)
        .describe("Index of the element as shown in the page listing")
        .with(Predicate::Interactive)
}

/// Route `event` to the element referenced by the `index` parameter
async fn send_to_element(params: &JsonMap, page: &ActionPage<'_>, event: InputEvent) -> Result<JsonValue, ActionError> {
    let node = page.element(params, "index")?;
    page.driver.dispatch_input(&ActionPage::target(node), &event).await?;
    debug!(index = node.index.0, event = event.name(), "Element input sent");
    Ok(json!({ "index": node.index.0 }))
}

pub struct NavigateAction {
    spec: ActionSpec,
}

impl NavigateAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("navigate", "Open a URL in the current tab")
                .param(ParamSpec::new("url", ParamKind::Url).describe("Absolute URL to open"))
                .effect(SideEffect::Navigates),
        }
    }
}

#[async_trait]
impl BrowserAction for NavigateAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let url = param_str(params, "url").unwrap_or_default();
        page.driver.navigate(url).await?;
        Ok(json!({ "url": url }))
    }
}

pub struct ClickAction {
    spec: ActionSpec,
}

impl ClickAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("click", "Click an element")
                .param(element_param())
                .effect(SideEffect::MutatesPage),
        }
    }
}

#[async_trait]
impl BrowserAction for ClickAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        send_to_element(params, &page, InputEvent::Click).await
    }
}

pub struct TypeAction {
    spec: ActionSpec,
}

impl TypeAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("type", "Type text into an input, textarea or editable element")
                .param(element_param())
                .param(ParamSpec::new("text", ParamKind::String).describe("Text to enter"))
                .param(
                    ParamSpec::new("clear", ParamKind::Boolean)
                        .describe("Replace the current value instead of appending (default true)")
                        .optional(),
                )
                .effect(SideEffect::MutatesPage),
        }
    }
}

#[async_trait]
impl BrowserAction for TypeAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let node = page.element(params, "index")?;
        if !node.interactivity.typable {
            return Err(ActionError::browser(format!("element {} does not accept text", node.index)));
        }

        let text = param_str(params, "text").unwrap_or_default().to_string();
        let clear = param_bool(params, "clear").unwrap_or(true);
        let chars = text.chars().count();
        send_to_element(params, &page, InputEvent::Type { text, clear }).await?;
        Ok(json!({ "index": node.index.0, "chars": chars }))
    }
}

pub struct ScrollAction {
    spec: ActionSpec,
    viewport_height: f64,
}

impl ScrollAction {
    pub fn new(viewport_height: u32) -> Self {
        Self {
            spec: ActionSpec::new("scroll", "Scroll the page, or a scrollable element, by whole pages")
                .param(ParamSpec::new(
                    "direction",
                    ParamKind::Enum(vec!["up".to_string(), "down".to_string()]),
                ))
                .param(
                    ParamSpec::new("pages", ParamKind::Integer)
                        .describe("Number of pages (default 1)")
                        .optional()
                        .with(Predicate::MinInt(1))
                        .with(Predicate::MaxInt(10)),
                )
                .param(
                    ParamSpec::new("index", ParamKind::ElementIndex)
                        .describe("Scrollable element; the whole page when omitted")
                        .optional(),
                )
                .effect(SideEffect::MutatesPage),
            viewport_height: f64::from(viewport_height),
        }
    }
}

#[async_trait]
impl BrowserAction for ScrollAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let pages = param_i64(params, "pages").unwrap_or(1) as f64;
        let sign = if param_str(params, "direction") == Some("up") { -1.0 } else { 1.0 };
        let dy = sign * pages * self.viewport_height * 0.8;

        if params.contains_key("index") {
            send_to_element(params, &page, InputEvent::Scroll { dx: 0.0, dy }).await?;
        } else {
            page.driver.scroll_viewport(dy).await?;
        }
        Ok(json!({ "scrolled_px": dy }))
    }
}

pub struct HoverAction {
    spec: ActionSpec,
}

impl HoverAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("hover", "Move the pointer over an element, e.g. to open a menu")
                .param(element_param())
                .effect(SideEffect::MutatesPage),
        }
    }
}

#[async_trait]
impl BrowserAction for HoverAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        send_to_element(params, &page, InputEvent::Hover).await
    }
}

pub struct SendKeysAction {
    spec: ActionSpec,
}

impl SendKeysAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("send_keys", "Focus an element and press a key such as Enter, Escape or Tab")
                .param(element_param())
                .param(
                    ParamSpec::new("key", ParamKind::String)
                        .describe("Key name")
                        .with(Predicate::NonEmpty)
                        .with(Predicate::MaxLength(32)),
                )
                .effect(SideEffect::MutatesPage),
        }
    }
}

#[async_trait]
impl BrowserAction for SendKeysAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let key = param_str(params, "key").unwrap_or_default().to_string();
        send_to_element(params, &page, InputEvent::Key { key }).await
    }
}

pub struct SelectOptionAction {
    spec: ActionSpec,
}

impl SelectOptionAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("select_option", "Choose an option of a <select> by value or visible text")
                .param(element_param())
                .param(ParamSpec::new("value", ParamKind::String).with(Predicate::NonEmpty))
                .effect(SideEffect::MutatesPage),
        }
    }
}

#[async_trait]
impl BrowserAction for SelectOptionAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let node = page.element(params, "index")?;
        if node.tag != "select" {
            return Err(ActionError::browser(format!("element {} is a <{}>, not a <select>", node.index, node.tag)));
        }
        let value = param_str(params, "value").unwrap_or_default().to_string();
        send_to_element(params, &page, InputEvent::Select { value }).await
    }
}

pub struct GoBackAction {
    spec: ActionSpec,
}

impl GoBackAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("go_back", "Go back to the previous page").effect(SideEffect::Navigates),
        }
    }
}

#[async_trait]
impl BrowserAction for GoBackAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, _params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        page.driver.go_back().await?;
        Ok(JsonValue::Null)
    }
}

pub struct WaitAction {
    spec: ActionSpec,
}

impl WaitAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("wait", "Wait for the page to settle")
                .param(
                    ParamSpec::new("seconds", ParamKind::Integer)
                        .with(Predicate::MinInt(1))
                        .with(Predicate::MaxInt(10)),
                )
                .timeout(Duration::from_secs(12)),
        }
    }
}

#[async_trait]
impl BrowserAction for WaitAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, _page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let seconds = param_i64(params, "seconds").unwrap_or(1).max(0) as u64;
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        Ok(json!({ "waited_secs": seconds }))
    }
}

pub struct ScreenshotAction {
    spec: ActionSpec,
}

impl ScreenshotAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("screenshot", "Capture the visible part of the page"),
        }
    }
}

#[async_trait]
impl BrowserAction for ScreenshotAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, _params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let png = page.driver.screenshot().await?;
        Ok(json!({ "format": "png", "bytes": png.len(), "png_base64": BASE64.encode(&png) }))
    }
}

pub struct ExtractTextAction {
    spec: ActionSpec,
}

impl ExtractTextAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new("extract_text", "Read the text of the page or of one element and its descendants")
                .param(
                    ParamSpec::new("index", ParamKind::ElementIndex)
                        .describe("Element to read; the whole page when omitted")
                        .optional(),
                ),
        }
    }
}

/// Visible text of `nodes[start]` and everything below it in pre-order
fn subtree_text(nodes: &[ElementNode], start: usize) -> Vec<&str> {
    let Some(root) = nodes.get(start) else {
        return Vec::new();
    };
    std::iter::once(root)
        .chain(nodes[start + 1..].iter().take_while(|n| n.depth > root.depth))
        .map(|n| n.text.as_str())
        .filter(|t| !t.is_empty())
        .collect()
}

fn page_text(snapshot: &Snapshot, index: Option<usize>) -> String {
    let parts = match index {
        Some(position) => subtree_text(snapshot.nodes(), position),
        None => snapshot
            .nodes()
            .iter()
            .map(|n| n.text.as_str())
            .filter(|t| !t.is_empty())
            .collect(),
    };
    let text = parts.join("\n");
    match text.char_indices().nth(MAX_EXTRACT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

#[async_trait]
impl BrowserAction for ExtractTextAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let snapshot = page
            .snapshot
            .ok_or_else(|| ActionError::browser("no page snapshot available"))?;

        let position = if params.contains_key("index") {
            let node = page.element(params, "index")?;
            snapshot.nodes().iter().position(|n| n.index == node.index)
        } else {
            None
        };

        Ok(json!({ "url": snapshot.url(), "text": page_text(snapshot, position) }))
    }
}

fn script_param(description: &str) -> ParamSpec {
    ParamSpec::new("script", ParamKind::String)
        .describe(description)
        .with(Predicate::NonEmpty)
        .with(Predicate::MaxLength(MAX_SCRIPT_CHARS))
}

fn args_param() -> ParamSpec {
    ParamSpec::new("args", ParamKind::Json)
        .describe("Arguments passed to the function, as a JSON array")
        .optional()
}

/// `args` as a positional list; a single non-array value is one argument
fn script_args(params: &JsonMap) -> Vec<JsonValue> {
    match params.get("args") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// JavaScript truthiness of a returned value
fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

pub struct EvaluateAction {
    spec: ActionSpec,
}

impl EvaluateAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new(
                "evaluate",
                "Run a JavaScript function in the page and return its JSON result. \
                 With an element index the element is passed as the first argument.",
            )
            .param(script_param("Function source, e.g. `(a, b) => a + b` or `(el) => el.textContent`"))
            .param(args_param())
            .param(
                ParamSpec::new("index", ParamKind::ElementIndex)
                    .describe("Element passed as the first argument")
                    .optional(),
            )
            .effect(SideEffect::MutatesPage),
        }
    }
}

#[async_trait]
impl BrowserAction for EvaluateAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let script = param_str(params, "script").unwrap_or_default();
        let args = script_args(params);

        let target = if params.contains_key("index") {
            Some(ActionPage::target(page.element(params, "index")?))
        } else {
            None
        };

        let result = page.driver.evaluate(script, &args, target.as_ref()).await?;
        debug!(element = ?target.as_ref().map(|t| t.index), "Evaluated page script");
        Ok(json!({ "result": result }))
    }
}

pub struct WaitForFunctionAction {
    spec: ActionSpec,
}

impl WaitForFunctionAction {
    pub fn new() -> Self {
        Self {
            spec: ActionSpec::new(
                "wait_for_function",
                "Poll a JavaScript function until it returns a truthy value. \
                 Without a script, waits for the document to finish loading.",
            )
            .param(script_param("Function source, e.g. `(sel) => document.querySelector(sel) !== null`").optional())
            .param(args_param())
            .param(
                ParamSpec::new("timeout_ms", ParamKind::Integer)
                    .describe("Give up after this many milliseconds (default 5000)")
                    .optional()
                    .with(Predicate::MinInt(100))
                    .with(Predicate::MaxInt(MAX_WAIT_MS)),
            )
            .timeout(Duration::from_millis(MAX_WAIT_MS as u64) + Duration::from_secs(2)),
        }
    }
}

#[async_trait]
impl BrowserAction for WaitForFunctionAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        let script = param_str(params, "script").unwrap_or(DOCUMENT_LOADED);
        let args = script_args(params);
        let limit = Duration::from_millis(param_i64(params, "timeout_ms").unwrap_or(DEFAULT_WAIT_MS).max(0) as u64);
        let started = tokio::time::Instant::now();

        loop {
            let value = page.driver.evaluate(script, &args, None).await?;
            if is_truthy(&value) {
                let waited_ms = started.elapsed().as_millis() as u64;
                debug!(waited_ms, "Wait condition met");
                return Ok(json!({ "value": value, "waited_ms": waited_ms }));
            }
            if started.elapsed() + WAIT_POLL_INTERVAL > limit {
                return Err(ActionError::timeout(format!("condition still false after {:?}", limit)));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

/// Register every built-in browser action
pub fn register_browser_actions(registry: &mut CapabilityRegistry, config: &BrowserConfig) -> Result<(), RegistryError> {
    let actions: Vec<Arc<dyn BrowserAction>> = vec![
        Arc::new(NavigateAction::new()),
        Arc::new(ClickAction::new()),
        Arc::new(TypeAction::new()),
        Arc::new(ScrollAction::new(config.height)),
        Arc::new(HoverAction::new()),
        Arc::new(SendKeysAction::new()),
        Arc::new(SelectOptionAction::new()),
        Arc::new(GoBackAction::new()),
        Arc::new(WaitAction::new()),
        Arc::new(ScreenshotAction::new()),
        Arc::new(ExtractTextAction::new()),
        Arc::new(EvaluateAction::new()),
        Arc::new(WaitForFunctionAction::new()),
    ];

    for action in actions {
        registry.register_action(action)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_core::config::ExtractorConfig;
    use wp_core::dom::PageExtractor;
    use wp_core::testing::{FakeDriver, FakePage, el};
    use wp_core::tool::{ActionErrorKind, ActionRequest, PageContext};

    fn form() -> FakePage {
        FakePage::new("https://shop.test/search", "Search").with_roots(vec![
            el("body")
                .child(el("h1").text("Find a lamp"))
                .child(el("input").attr("name", "q").attr("type", "text"))
                .child(el("button").text("Search"))
                .child(
                    el("select")
                        .attr("name", "sort")
                        .child(el("option").text("Price"))
                        .child(el("option").text("Rating")),
                )
                .child(el("a").text("Help").attr("href", "/help")),
        ])
    }

    async fn setup() -> (Arc<FakeDriver>, CapabilityRegistry, PageContext) {
        let driver = Arc::new(FakeDriver::new(form()));
        let mut registry = CapabilityRegistry::new();
        register_browser_actions(&mut registry, &BrowserConfig::default()).unwrap();
        let mut page = PageContext::new(driver.clone(), PageExtractor::new(ExtractorConfig::default()));
        page.observe().await.unwrap();
        (driver, registry, page)
    }

    fn index_of(page: &PageContext, text: &str) -> u32 {
        page.current().unwrap().find_by_text(text).unwrap().index.0
    }

    #[test]
    fn test_catalog_order() {
        let mut registry = CapabilityRegistry::new();
        register_browser_actions(&mut registry, &BrowserConfig::default()).unwrap();
        assert_eq!(registry.names()[0], "navigate");
        assert_eq!(registry.len(), 13);
        assert!(registry.spec("evaluate").unwrap().effect.changes_page());
        assert!(!registry.spec("wait_for_function").unwrap().effect.changes_page());
        assert!(registry.spec("go_back").unwrap().effect.changes_page());
        assert!(!registry.spec("extract_text").unwrap().effect.changes_page());
    }

    #[tokio::test]
    async fn test_type_into_input() {
        let (driver, registry, mut page) = setup().await;
        let input = page
            .current()
            .unwrap()
            .nodes()
            .iter()
            .find(|n| n.tag == "input")
            .unwrap()
            .index
            .0;

        let result = registry
            .invoke(
                &ActionRequest::new("type").param("index", input).param("text", "desk lamp"),
                &mut page,
            )
            .await
            .unwrap();

        assert!(result.success, "{}", result.describe());
        assert_eq!(result.observation["chars"], 9);
        let (target, event) = driver.inputs().pop().unwrap();
        assert_eq!(target.index, input);
        assert_eq!(
            event,
            InputEvent::Type {
                text: "desk lamp".to_string(),
                clear: true
            }
        );
    }

    #[tokio::test]
    async fn test_type_rejects_buttons() {
        let (driver, registry, mut page) = setup().await;
        let button = index_of(&page, "Search");

        let result = registry
            .invoke(&ActionRequest::new("type").param("index", button).param("text", "x"), &mut page)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(driver.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_navigate_and_go_back() {
        let (driver, registry, mut page) = setup().await;

        let result = registry
            .invoke(&ActionRequest::new("navigate").param("url", "https://shop.test/cart"), &mut page)
            .await
            .unwrap();
        assert_eq!(result.snapshot.unwrap().url(), "https://shop.test/cart");

        let result = registry.invoke(&ActionRequest::new("go_back"), &mut page).await.unwrap();
        assert!(result.success);
        assert_eq!(page.current().unwrap().url(), "https://shop.test/search");
        assert_eq!(driver.navigations(), vec!["https://shop.test/cart".to_string()]);
    }

    #[tokio::test]
    async fn test_scroll_page_and_validation() {
        let (driver, registry, mut page) = setup().await;

        let result = registry
            .invoke(
                &ActionRequest::new("scroll").param("direction", "down").param("pages", 2),
                &mut page,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(driver.scrolled(), 2.0 * 1100.0 * 0.8);

        let err = registry
            .invoke(&ActionRequest::new("scroll").param("direction", "left"), &mut page)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("direction"));
    }

    #[tokio::test]
    async fn test_select_option_checks_tag() {
        let (driver, registry, mut page) = setup().await;
        let select = page
            .current()
            .unwrap()
            .nodes()
            .iter()
            .find(|n| n.tag == "select")
            .unwrap()
            .index
            .0;

        let result = registry
            .invoke(
                &ActionRequest::new("select_option").param("index", select).param("value", "Rating"),
                &mut page,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            driver.inputs()[0].1,
            InputEvent::Select {
                value: "Rating".to_string()
            }
        );

        let link = index_of(&page, "Help");
        let result = registry
            .invoke(
                &ActionRequest::new("select_option").param("index", link).param("value", "x"),
                &mut page,
            )
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_extract_text() {
        let (_driver, registry, mut page) = setup().await;

        let result = registry.invoke(&ActionRequest::new("extract_text"), &mut page).await.unwrap();
        let text = result.observation["text"].as_str().unwrap();
        assert!(text.starts_with("Find a lamp"));
        assert!(text.contains("Rating"));

        let select = page
            .current()
            .unwrap()
            .nodes()
            .iter()
            .find(|n| n.tag == "select")
            .unwrap()
            .index
            .0;
        let result = registry
            .invoke(&ActionRequest::new("extract_text").param("index", select), &mut page)
            .await
            .unwrap();
        assert_eq!(result.observation["text"], "Price\nRating");
    }

    #[tokio::test]
    async fn test_evaluate_page_script() {
        let (driver, registry, mut page) = setup().await;
        driver.on_evaluate("(a, b) => a + b", vec![json!(42)]);

        let result = registry
            .invoke(
                &ActionRequest::new("evaluate")
                    .param("script", "(a, b) => a + b")
                    .param("args", json!([20, 22])),
                &mut page,
            )
            .await
            .unwrap();

        assert!(result.success, "{}", result.describe());
        assert_eq!(result.observation["result"], 42);
        assert!(result.snapshot.is_some());
        let (script, args, target) = driver.evaluations().pop().unwrap();
        assert_eq!(script, "(a, b) => a + b");
        assert_eq!(args, vec![json!(20), json!(22)]);
        assert!(target.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_on_element() {
        let (driver, registry, mut page) = setup().await;
        let heading = page
            .current()
            .unwrap()
            .nodes()
            .iter()
            .find(|n| n.tag == "h1")
            .unwrap()
            .index
            .0;
        driver.on_evaluate("(el, suffix) => el.textContent + suffix", vec![json!("Find a lamp!")]);

        let result = registry
            .invoke(
                &ActionRequest::new("evaluate")
                    .param("script", "(el, suffix) => el.textContent + suffix")
                    .param("args", "!")
                    .param("index", heading),
                &mut page,
            )
            .await
            .unwrap();

        assert_eq!(result.observation["result"], "Find a lamp!");
        let (_, args, target) = driver.evaluations().pop().unwrap();
        assert_eq!(args, vec![json!("!")]);
        assert_eq!(target.unwrap().index, heading);
    }

    #[tokio::test]
    async fn test_evaluate_script_error_is_failed_result() {
        let (_driver, registry, mut page) = setup().await;

        let result = registry
            .invoke(&ActionRequest::new("evaluate").param("script", "() => missing()"), &mut page)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.describe().contains("Page script failed"), "{}", result.describe());

        let err = registry
            .invoke(&ActionRequest::new("evaluate").param("script", ""), &mut page)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("script"));
    }

    #[tokio::test]
    async fn test_wait_for_function_polls_until_truthy() {
        let (driver, registry, mut page) = setup().await;
        let script = "(sel) => document.querySelector(sel) !== null";
        driver.on_evaluate(script, vec![json!(false), json!(0), json!(true)]);

        let result = registry
            .invoke(
                &ActionRequest::new("wait_for_function")
                    .param("script", script)
                    .param("args", json!(["#results"]))
                    .param("timeout_ms", 2000),
                &mut page,
            )
            .await
            .unwrap();

        assert!(result.success, "{}", result.describe());
        assert_eq!(result.observation["value"], true);
        assert_eq!(driver.evaluations().len(), 3);
        assert!(result.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_function_times_out() {
        let (driver, registry, mut page) = setup().await;
        driver.on_evaluate("() => window.appReady", vec![JsonValue::Null]);

        let result = registry
            .invoke(
                &ActionRequest::new("wait_for_function")
                    .param("script", "() => window.appReady")
                    .param("timeout_ms", 250),
                &mut page,
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ActionErrorKind::Timeout);
        assert!(driver.evaluations().len() >= 2);
    }

    #[tokio::test]
    async fn test_wait_for_document_load_by_default() {
        let (driver, registry, mut page) = setup().await;
        driver.on_evaluate(DOCUMENT_LOADED, vec![json!(true)]);

        let result = registry
            .invoke(&ActionRequest::new("wait_for_function"), &mut page)
            .await
            .unwrap();
        assert!(result.success, "{}", result.describe());
        assert_eq!(driver.evaluations()[0].0, DOCUMENT_LOADED);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({"ready": false})));
    }

    #[tokio::test]
    async fn test_screenshot_is_base64() {
        let (_driver, registry, mut page) = setup().await;
        let result = registry.invoke(&ActionRequest::new("screenshot"), &mut page).await.unwrap();
        let encoded = result.observation["png_base64"].as_str().unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap()[..4], b"\x89PNG"[..]);
    }
}
