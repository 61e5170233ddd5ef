//! In-memory browser, planner and tools for tests and benches

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use crate::agent::{Planner, PlannerDecision, PlannerError};
use crate::context::ContextWindow;
use crate::dom::{ElementIndex, ElementNode, Interactivity, Snapshot, fingerprint};
use crate::driver::{
    BrowserDriver, DriverError, ElementTarget, FramePath, InputEvent, PageState, RawFrame, RawNode, Rect,
};
use crate::llm::ToolDefinition;
use crate::tool::{
    ActionError, ActionPage, ActionRequest, ActionSpec, BrowserAction, JsonMap, ParamKind, ParamSpec,
    Predicate, RemoteTool, SideEffect, ToolDescriptor, ToolError, ToolInput,
};

/// Element builder for fake pages
#[derive(Debug, Clone)]
pub struct FakeElement {
    node: RawNode,
    children: Vec<FakeElement>,
}

/// Visible element with a 100x20 box
pub fn el(tag: &str) -> FakeElement {
    FakeElement {
        node: RawNode {
            tag: tag.to_string(),
            visible: true,
            rect: Rect::new(0.0, 0.0, 100.0, 20.0),
            ..RawNode::default()
        },
        children: Vec::new(),
    }
}

impl FakeElement {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.node.text = text.into();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.node.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn invisible(mut self) -> Self {
        self.node.visible = false;
        self
    }

    pub fn obscured(mut self) -> Self {
        self.node.obscured = true;
        self
    }

    pub fn cursor(mut self, cursor: &str) -> Self {
        self.node.cursor = Some(cursor.to_string());
        self
    }

    pub fn frame(mut self, id: &str, cross_origin: bool) -> Self {
        self.node.frame = Some(RawFrame {
            id: id.to_string(),
            src: None,
            cross_origin,
        });
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.node.rect = Rect::new(x, y, width, height);
        self
    }

    fn build(self, parent_xpath: &str, position: usize) -> RawNode {
        let FakeElement { mut node, children } = self;
        node.xpath = format!("{}/{}[{}]", parent_xpath, node.tag, position);
        node.children = build_siblings(children, &node.xpath);
        node
    }
}

/// XPath positions count siblings with the same tag
fn build_siblings(elements: Vec<FakeElement>, parent_xpath: &str) -> Vec<RawNode> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    elements
        .into_iter()
        .map(|element| {
            let position = seen.entry(element.node.tag.clone()).or_insert(0);
            *position += 1;
            let position = *position;
            element.build(parent_xpath, position)
        })
        .collect()
}

/// One fake document with its frames
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub title: String,
    roots: Vec<RawNode>,
    frames: HashMap<FramePath, Vec<RawNode>>,
}

impl FakePage {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn with_roots(mut self, roots: Vec<FakeElement>) -> Self {
        self.roots = build_siblings(roots, "");
        self
    }

    pub fn with_frame(mut self, path: FramePath, roots: Vec<FakeElement>) -> Self {
        self.frames.insert(path, build_siblings(roots, ""));
        self
    }

    fn document(&self, path: &FramePath) -> Option<&Vec<RawNode>> {
        if path.is_root() {
            Some(&self.roots)
        } else {
            self.frames.get(path)
        }
    }
}

fn find_by_xpath<'a>(nodes: &'a [RawNode], xpath: &str) -> Option<&'a RawNode> {
    nodes.iter().find_map(|node| {
        if node.xpath == xpath {
            Some(node)
        } else {
            find_by_xpath(&node.children, xpath)
        }
    })
}

#[derive(Default)]
struct DriverState {
    page: FakePage,
    back: Vec<FakePage>,
    loading: bool,
    failing_queries: usize,
    failing_inputs: bool,
    page_state_calls: usize,
    inputs: Vec<(ElementTarget, InputEvent)>,
    navigations: Vec<String>,
    scrolled: f64,
    on_click: HashMap<String, FakePage>,
    routes: HashMap<String, FakePage>,
    scripts: HashMap<String, VecDeque<JsonValue>>,
    evaluations: Vec<(String, Vec<JsonValue>, Option<ElementTarget>)>,
}

/// Browser driver over scripted pages
pub struct FakeDriver {
    state: Mutex<DriverState>,
    input_delay: Mutex<Option<Duration>>,
}

impl FakeDriver {
    pub fn new(page: FakePage) -> Self {
        Self {
            state: Mutex::new(DriverState {
                page,
                ..DriverState::default()
            }),
            input_delay: Mutex::new(None),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_page(&self, page: FakePage) {
        self.state().page = page;
    }

    pub fn current_url(&self) -> String {
        self.state().page.url.clone()
    }

    /// Report the document as still loading
    pub fn set_loading(&self, loading: bool) {
        self.state().loading = loading;
    }

    /// Fail the next `count` tree queries
    pub fn fail_next_queries(&self, count: usize) {
        self.state().failing_queries = count;
    }

    /// Reject every input event
    pub fn fail_inputs(&self, failing: bool) {
        self.state().failing_inputs = failing;
    }

    pub fn set_input_delay(&self, delay: Duration) {
        *self.input_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    /// Clicking an element with `text` loads `page`
    pub fn on_click(&self, text: &str, page: FakePage) {
        self.state().on_click.insert(text.to_string(), page);
    }

    /// Navigating to `url` loads `page`
    pub fn add_route(&self, url: &str, page: FakePage) {
        self.state().routes.insert(url.to_string(), page);
    }

    /// Evaluating `function` yields each of `values` in turn, then keeps the last
    pub fn on_evaluate(&self, function: &str, values: Vec<JsonValue>) {
        self.state().scripts.insert(function.to_string(), values.into());
    }

    pub fn evaluations(&self) -> Vec<(String, Vec<JsonValue>, Option<ElementTarget>)> {
        self.state().evaluations.clone()
    }

    pub fn page_state_calls(&self) -> usize {
        self.state().page_state_calls
    }

    pub fn inputs(&self) -> Vec<(ElementTarget, InputEvent)> {
        self.state().inputs.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn scrolled(&self) -> f64 {
        self.state().scrolled
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state();
        state.navigations.push(url.to_string());
        let next = state
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| FakePage::new(url, ""));
        let previous = std::mem::replace(&mut state.page, next);
        state.back.push(previous);
        Ok(())
    }

    async fn page_state(&self) -> Result<PageState, DriverError> {
        let mut state = self.state();
        state.page_state_calls += 1;
        Ok(PageState {
            url: state.page.url.clone(),
            title: state.page.title.clone(),
            ready: !state.loading,
        })
    }

    async fn query_tree(&self, frame_path: &FramePath) -> Result<Vec<RawNode>, DriverError> {
        let mut state = self.state();
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(DriverError::Query("document detached".to_string()));
        }
        state
            .page
            .document(frame_path)
            .cloned()
            .ok_or_else(|| DriverError::FrameNotFound(frame_path.to_string()))
    }

    async fn dispatch_input(&self, target: &ElementTarget, event: &InputEvent) -> Result<(), DriverError> {
        let delay = *self.input_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_inputs {
            return Err(DriverError::Input(format!("{} rejected", event.name())));
        }

        let text = state
            .page
            .document(&target.frame_path)
            .and_then(|roots| find_by_xpath(roots, &target.locator))
            .map(|node| node.text.clone())
            .ok_or_else(|| DriverError::ElementNotFound(target.locator.clone()))?;

        state.inputs.push((target.clone(), event.clone()));

        if *event == InputEvent::Click {
            if let Some(next) = state.on_click.get(&text).cloned() {
                let previous = std::mem::replace(&mut state.page, next);
                state.back.push(previous);
            }
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn go_back(&self) -> Result<(), DriverError> {
        let mut state = self.state();
        let previous = state
            .back
            .pop()
            .ok_or_else(|| DriverError::Navigation("no previous page".to_string()))?;
        state.page = previous;
        Ok(())
    }

    async fn scroll_viewport(&self, dy: f64) -> Result<(), DriverError> {
        self.state().scrolled += dy;
        Ok(())
    }

    async fn evaluate(
        &self,
        function: &str,
        args: &[JsonValue],
        target: Option<&ElementTarget>,
    ) -> Result<JsonValue, DriverError> {
        let mut state = self.state();
        if let Some(target) = target {
            state
                .page
                .document(&target.frame_path)
                .and_then(|roots| find_by_xpath(roots, &target.locator))
                .ok_or_else(|| DriverError::ElementNotFound(target.locator.clone()))?;
        }
        state
            .evaluations
            .push((function.to_string(), args.to_vec(), target.cloned()));

        let values = state
            .scripts
            .get_mut(function)
            .ok_or_else(|| DriverError::Script(format!("SyntaxError: unexpected script '{}'", function)))?;
        let value = if values.len() > 1 {
            values.pop_front()
        } else {
            values.front().cloned()
        };
        Ok(value.unwrap_or(JsonValue::Null))
    }
}

/// Flat snapshot at `https://test.local/`, indices assigned in order
pub fn snapshot_with(items: &[(&str, &str, bool)]) -> Snapshot {
    snapshot_at("https://test.local/", items)
}

/// Flat snapshot of `(tag, text, interactive)` items at `url`
pub fn snapshot_at(url: &str, items: &[(&str, &str, bool)]) -> Snapshot {
    let root = FramePath::root();
    let nodes = items
        .iter()
        .enumerate()
        .map(|(i, (tag, text, interactive))| {
            let raw = RawNode {
                tag: tag.to_string(),
                text: text.to_string(),
                visible: true,
                rect: Rect::new(0.0, 20.0 * i as f64, 100.0, 20.0),
                xpath: format!("/{}[{}]", tag, i + 1),
                ..RawNode::default()
            };
            let typable = *interactive && matches!(*tag, "input" | "textarea");
            ElementNode {
                index: ElementIndex(i as u32),
                tag: raw.tag.clone(),
                role: None,
                text: raw.text.clone(),
                rect: raw.rect,
                interactivity: Interactivity {
                    clickable: *interactive && !typable,
                    typable,
                    scrollable: false,
                },
                frame_path: root.clone(),
                attributes: Default::default(),
                locator: raw.xpath.clone(),
                parent: None,
                depth: 0,
                fingerprint: fingerprint(&raw, &[], &root),
            }
        })
        .collect();

    Snapshot::new(1, url, "Test page", nodes)
}

/// Local action with a configurable spec.
///
/// When its action spec has an `index` parameter the action clicks that element.
pub struct TestAction {
    spec: ActionSpec,
    delay: Option<Duration>,
    settle: Option<Duration>,
    executions: AtomicUsize,
}

impl TestAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self {
            spec,
            delay: None,
            settle: None,
            executions: AtomicUsize::new(0),
        }
    }

    pub fn clicker() -> Self {
        Self::new(
            ActionSpec::new("click", "Click an element")
                .param(
                    ParamSpec::new("index", ParamKind::ElementIndex)
                        .describe("Element index")
                        .with(Predicate::Interactive),
                )
                .effect(SideEffect::MutatesPage),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Keep running for `delay` after the click has landed
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle = Some(delay);
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserAction for TestAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.spec.param_spec("index").is_none() {
            return Ok(JsonValue::Null);
        }

        let node = page.element(params, "index")?;
        page.driver
            .dispatch_input(&ActionPage::target(node), &InputEvent::Click)
            .await?;
        if let Some(settle) = self.settle {
            tokio::time::sleep(settle).await;
        }
        Ok(json!({ "clicked": node.index.0 }))
    }
}

/// Remote tool that echoes what it was given
pub struct FakeTool {
    descriptor: ToolDescriptor,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeTool {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: ToolDescriptor::new(name, "Fake remote tool"),
            delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.descriptor.concurrency_limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.descriptor.input.push(param);
        self
    }

    pub fn depends_on_page(mut self) -> Self {
        self.descriptor.depends_on_page = true;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTool for FakeTool {
    fn describe(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn invoke(&self, input: ToolInput) -> Result<JsonValue, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(ToolError::Failed(message.clone()));
        }

        Ok(json!({
            "tool": self.descriptor.name,
            "params": input.params,
            "page_url": input.page_url,
            "has_screenshot": input.screenshot.is_some(),
        }))
    }
}

#[derive(Debug, Clone)]
enum Step {
    Act(ActionRequest),
    /// Click the element whose rendered line contains this text
    ClickText(String),
    Complete(String),
    Malformed(String),
}

/// Planner that replays a fixed script, then repeats its last step if asked.
///
/// Completes once the script runs out.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Step>>,
    repeat: Option<Step>,
    delay: Option<Duration>,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            delay: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(step);
        self
    }

    pub fn act(self, request: ActionRequest) -> Self {
        self.push(Step::Act(request))
    }

    pub fn click_text(self, text: &str) -> Self {
        self.push(Step::ClickText(text.to_string()))
    }

    pub fn complete(self, summary: &str) -> Self {
        self.push(Step::Complete(summary.to_string()))
    }

    pub fn malformed(self, message: &str) -> Self {
        self.push(Step::Malformed(message.to_string()))
    }

    pub fn repeat_click_text(mut self, text: &str) -> Self {
        self.repeat = Some(Step::ClickText(text.to_string()));
        self
    }

    pub fn repeat_malformed(mut self, message: &str) -> Self {
        self.repeat = Some(Step::Malformed(message.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// User prompt of every call so far
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for ScriptedPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the first `[n]<...>` line mentioning `text`
fn index_for_text(prompt: &str, text: &str) -> Option<u32> {
    prompt
        .lines()
        .filter(|line| line.starts_with('[') && line.contains(text))
        .find_map(|line| line[1..].split(']').next()?.parse().ok())
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn next_action(
        &self,
        context: &ContextWindow,
        _catalog: &[ToolDefinition],
    ) -> Result<PlannerDecision, PlannerError> {
        let prompt = context.user_prompt();
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).push(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .or_else(|| self.repeat.clone());

        match step {
            None => Ok(PlannerDecision::Complete {
                summary: "script finished".to_string(),
            }),
            Some(Step::Act(request)) => Ok(PlannerDecision::Act(request)),
            Some(Step::Complete(summary)) => Ok(PlannerDecision::Complete { summary }),
            Some(Step::Malformed(message)) => Err(PlannerError::Malformed(message)),
            Some(Step::ClickText(text)) => index_for_text(&prompt, &text)
                .map(|index| PlannerDecision::Act(ActionRequest::new("click").param("index", index)))
                .ok_or_else(|| PlannerError::Malformed(format!("no element showing '{}'", text))),
        }
    }
}
