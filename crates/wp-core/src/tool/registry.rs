//! Capability registry: catalog, validation and dispatch

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::dom::Snapshot;
use crate::llm::ToolDefinition;

use super::definition::{ActionSpec, ParamKind, TargetKind, ToolDescriptor};
use super::page::PageContext;
use super::traits::{
    ActionError, ActionPage, ActionRequest, ActionResult, BrowserAction, RemoteTool, ToolInput,
};
use super::validate::{ValidationError, validate_params};

/// Default bound for local browser actions without their own timeout
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    #[error("Invalid capability '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },
}

enum Capability {
    Local(Arc<dyn BrowserAction>),
    Remote {
        tool: Arc<dyn RemoteTool>,
        descriptor: ToolDescriptor,
        permits: Arc<Semaphore>,
    },
}

struct Entry {
    spec: ActionSpec,
    capability: Capability,
}

/// Every action and tool the planner may choose from.
///
/// Populated once at startup; read-only afterwards.
pub struct CapabilityRegistry {
    entries: HashMap<String, Entry>,
    /// Registration order, used for the planner catalog
    order: Vec<String>,
    action_timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::with_action_timeout(DEFAULT_ACTION_TIMEOUT)
    }

    pub fn with_action_timeout(action_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            action_timeout,
        }
    }

    pub fn register_action(&mut self, action: Arc<dyn BrowserAction>) -> Result<(), RegistryError> {
        let spec = action.spec().clone();
        self.insert(spec, Capability::Local(action))
    }

    pub fn register_tool(&mut self, tool: Arc<dyn RemoteTool>) -> Result<(), RegistryError> {
        let descriptor = tool.describe();
        if descriptor.concurrency_limit == 0 {
            return Err(RegistryError::InvalidSpec {
                name: descriptor.name,
                reason: "concurrency limit must be at least 1".to_string(),
            });
        }

        let spec = descriptor.to_action_spec();
        let permits = Arc::new(Semaphore::new(descriptor.concurrency_limit));
        self.insert(
            spec,
            Capability::Remote {
                tool,
                descriptor,
                permits,
            },
        )
    }

    fn insert(&mut self, spec: ActionSpec, capability: Capability) -> Result<(), RegistryError> {
        check_spec(&spec)?;
        if self.entries.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateCapability(spec.name));
        }

        info!(
            name = %spec.name,
            target = ?spec.target,
            effect = ?spec.effect,
            params = spec.params.len(),
            "Registered capability"
        );

        self.order.push(spec.name.clone());
        self.entries.insert(spec.name.clone(), Entry { spec, capability });
        Ok(())
    }

    pub fn spec(&self, name: &str) -> Option<&ActionSpec> {
        self.entries.get(name).map(|e| &e.spec)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Catalog rendered as planner tool definitions, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|e| ToolDefinition::new(&e.spec.name, &e.spec.description, e.spec.input_schema()))
            .collect()
    }

    pub fn validate(&self, request: &ActionRequest, snapshot: Option<&Snapshot>) -> Result<(), ValidationError> {
        self.checked_entry(request, snapshot).map(|_| ())
    }

    fn checked_entry(&self, request: &ActionRequest, snapshot: Option<&Snapshot>) -> Result<&Entry, ValidationError> {
        let entry = self
            .entries
            .get(&request.name)
            .ok_or_else(|| ValidationError::UnknownAction(request.name.clone()))?;
        validate_params(&entry.spec, &request.params, snapshot)?;
        Ok(entry)
    }

    /// Validate, then execute one request.
    ///
    /// Validation failures are returned as `Err` and nothing runs. Execution
    /// failures, including timeouts, come back as a failed `ActionResult`.
    pub async fn invoke(
        &self,
        request: &ActionRequest,
        page: &mut PageContext,
    ) -> Result<ActionResult, ValidationError> {
        let snapshot = page.current().cloned();
        let entry = self.checked_entry(request, snapshot.as_deref())?;

        let result = match &entry.capability {
            Capability::Local(action) => self.run_local(action.as_ref(), &entry.spec, request, page).await,
            Capability::Remote {
                tool,
                descriptor,
                permits,
            } => run_remote(tool.as_ref(), descriptor, permits, request, page).await,
        };

        info!(
            action = %request.name,
            success = result.success,
            latency_ms = result.latency.as_millis() as u64,
            error = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or(""),
            "Capability invoked"
        );

        Ok(result)
    }

    /// Run several independent remote-tool requests concurrently.
    ///
    /// Each tool's concurrency limit still applies. Browser actions are
    /// rejected since they need exclusive use of the page.
    pub async fn invoke_tools(
        &self,
        requests: &[ActionRequest],
        page: &PageContext,
    ) -> Vec<Result<ActionResult, ValidationError>> {
        let snapshot = page.current().cloned();

        let calls = requests.iter().map(|request| {
            let snapshot = snapshot.clone();
            async move {
                let entry = self.checked_entry(request, snapshot.as_deref())?;
                match &entry.capability {
                    Capability::Local(_) => Err(ValidationError::NotFanOut(request.name.clone())),
                    Capability::Remote {
                        tool,
                        descriptor,
                        permits,
                    } => Ok(run_remote(tool.as_ref(), descriptor, permits, request, page).await),
                }
            }
        });

        debug!(count = requests.len(), "Fanning out tool invocations");
        join_all(calls).await
    }

    async fn run_local(
        &self,
        action: &dyn BrowserAction,
        spec: &ActionSpec,
        request: &ActionRequest,
        page: &mut PageContext,
    ) -> ActionResult {
        let limit = spec.timeout.unwrap_or(self.action_timeout);
        let driver = Arc::clone(page.driver());
        let snapshot = page.current().cloned();
        let lock = Arc::clone(page.lock());
        let started = Instant::now();

        let outcome = {
            let execution = action.execute(
                &request.params,
                ActionPage {
                    driver: driver.as_ref(),
                    snapshot: snapshot.as_deref(),
                },
            );

            if spec.effect.changes_page() {
                let _guard = lock.write().await;
                tokio::time::timeout(limit, execution).await
            } else {
                let _guard = lock.read().await;
                tokio::time::timeout(limit, execution).await
            }
        };
        let latency = started.elapsed();

        let result = match outcome {
            Ok(Ok(observation)) => ActionResult::ok(observation, latency),
            Ok(Err(err)) => ActionResult::failed(err, latency),
            Err(_) => ActionResult::failed(
                ActionError::timeout(format!("{} timed out after {:?}", spec.name, limit)),
                latency,
            ),
        };

        // A failed or timed-out action may still have moved the page
        if !spec.effect.changes_page() {
            return result;
        }

        match page.observe().await {
            Ok(after) => result.with_snapshot(after),
            Err(e) => {
                warn!(action = %spec.name, error = %e, "Re-extraction after action failed");
                result
            }
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_remote(
    tool: &dyn RemoteTool,
    descriptor: &ToolDescriptor,
    permits: &Semaphore,
    request: &ActionRequest,
    page: &PageContext,
) -> ActionResult {
    let started = Instant::now();

    let call = async {
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| ActionError::tool("tool is shut down"))?;

        let outcome = if descriptor.depends_on_page {
            let _guard = page.lock().read().await;
            let screenshot = page.driver().screenshot().await?;
            let input = ToolInput {
                params: request.params.clone(),
                page_url: page.current().map(|s| s.url().to_string()),
                screenshot: Some(screenshot),
            };
            tool.invoke(input).await
        } else {
            tool.invoke(ToolInput::new(request.params.clone())).await
        };

        outcome.map_err(|e| ActionError::tool(e.to_string()))
    };

    let outcome = tokio::time::timeout(descriptor.timeout, call).await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(observation)) => ActionResult::ok(observation, latency),
        Ok(Err(err)) => ActionResult::failed(err, latency),
        Err(_) => {
            warn!(tool = %descriptor.name, timeout = ?descriptor.timeout, "Remote tool timed out");
            ActionResult::failed(
                ActionError::timeout(format!(
                    "{} timed out after {:?}",
                    descriptor.name, descriptor.timeout
                )),
                latency,
            )
        }
    }
}

/// Tool names must be usable as LLM function names
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn check_spec(spec: &ActionSpec) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSpec {
        name: spec.name.clone(),
        reason,
    };

    if !valid_name(&spec.name) {
        return Err(invalid("name must be 1-64 characters of [A-Za-z0-9_-]".to_string()));
    }
    if spec.target == TargetKind::LocalBrowser && spec.timeout == Some(Duration::ZERO) {
        return Err(invalid("timeout must be non-zero".to_string()));
    }

    let mut seen = HashSet::new();
    for param in &spec.params {
        if param.name.is_empty() {
            return Err(invalid("parameter with empty name".to_string()));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(invalid(format!("duplicate parameter '{}'", param.name)));
        }
        if matches!(&param.kind, ParamKind::Enum(values) if values.is_empty()) {
            return Err(invalid(format!("enum parameter '{}' has no values", param.name)));
        }
    }

    Ok(())
}
