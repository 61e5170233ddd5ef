//! Orchestrator: the step loop
//!
//! ```text
//! Planning -> Validating -> Executing -> Observing -> Planning ...
//!     |            |
//!     +-> Completed / Failed   (Validating loops back to Planning on error)
//! ```
//!
//! Every suspension point is bounded by a timeout and cancellation is
//! checked between states.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::context::ContextManager;
use crate::dom::Snapshot;
use crate::history::{HistoryEntry, HistoryStore, HistoryTracker};
use crate::tool::{ActionRequest, ActionResult, CapabilityRegistry, PageContext};

use super::planner::{Planner, PlannerDecision, PlannerError};
use super::state::{AgentState, CancelHandle, FailureReason, RunOutcome, TaskSpec};

/// Per-run counters
#[derive(Debug, Default)]
struct Counters {
    steps_executed: u32,
    consecutive_failures: u32,
    malformed: u32,
}

pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    planner: Arc<dyn Planner>,
    page: PageContext,
    context: ContextManager,
    config: AgentConfig,
    store: Option<HistoryStore>,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        planner: Arc<dyn Planner>,
        page: PageContext,
        context: ContextManager,
        config: AgentConfig,
    ) -> Self {
        Self {
            registry,
            planner,
            page,
            context,
            config,
            store: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Persist every run's history
    pub fn with_history_store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Drive `task` to a terminal state
    pub async fn run(&mut self, task: TaskSpec) -> RunOutcome {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let step_limit = task.step_limit.unwrap_or(self.config.max_steps);
        let wall_clock = task.wall_clock_limit.unwrap_or_else(|| self.config.wall_clock());

        info!(
            run_id = %run_id,
            task = %task.description,
            step_limit,
            wall_clock_secs = wall_clock.as_secs(),
            "Starting run"
        );

        let mut history = match self.store.take() {
            Some(store) => HistoryTracker::with_store(store, run_id.clone()),
            None => HistoryTracker::new(),
        };
        self.page.reset();

        let mut counters = Counters::default();
        let mut feedback = Vec::new();

        if let Some(url) = &task.start_url {
            if let Err(message) = self.open_start_url(url, wall_clock).await {
                warn!(url = %url, error = %message, "Could not open start URL");
                feedback.push(format!("Could not open start URL {}: {}", url, message));
            }
        }

        let state = self
            .step_loop(&task, &mut history, &mut counters, &mut feedback, started, step_limit, wall_clock)
            .await;

        let elapsed = started.elapsed();
        match &state {
            AgentState::Completed { summary } => info!(
                run_id = %run_id,
                steps = counters.steps_executed,
                elapsed_ms = elapsed.as_millis() as u64,
                summary = %summary,
                "Run completed"
            ),
            AgentState::Failed(reason) => warn!(
                run_id = %run_id,
                steps = counters.steps_executed,
                elapsed_ms = elapsed.as_millis() as u64,
                reason = %reason,
                "Run failed"
            ),
            _ => {}
        }

        let (history, store) = history.into_parts();
        self.store = store;

        RunOutcome {
            state,
            history,
            steps_executed: counters.steps_executed,
            elapsed,
        }
    }

    async fn open_start_url(&self, url: &str, limit: Duration) -> Result<(), String> {
        let _guard = self.page.lock().write().await;
        match tokio::time::timeout(limit, self.page.driver().navigate(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("navigation timed out".to_string()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn step_loop(
        &mut self,
        task: &TaskSpec,
        history: &mut HistoryTracker,
        counters: &mut Counters,
        feedback: &mut Vec<String>,
        started: Instant,
        step_limit: u32,
        wall_clock: Duration,
    ) -> AgentState {
        let catalog = self.registry.definitions();

        loop {
            // Planning
            if self.cancel.is_cancelled() {
                return AgentState::Failed(FailureReason::Cancelled);
            }
            let Some(remaining) = wall_clock.checked_sub(started.elapsed()) else {
                return AgentState::Failed(FailureReason::WallClock { limit: wall_clock });
            };
            self.transition(&AgentState::Planning, counters);

            let snapshot = match tokio::time::timeout(remaining, self.page.observe()).await {
                Err(_) => return AgentState::Failed(FailureReason::WallClock { limit: wall_clock }),
                Ok(Err(e)) => {
                    warn!(error = %e, "Could not capture page");
                    if let Some(failed) = self.count_failure(counters) {
                        return failed;
                    }
                    continue;
                }
                Ok(Ok(snapshot)) => snapshot,
            };

            if task.success_predicate.as_ref().is_some_and(|p| p(&snapshot)) {
                return AgentState::Completed {
                    summary: format!("Success condition met at {}", snapshot.url()),
                };
            }

            let window = match self.context.build(history, &task.description, &snapshot, feedback.as_slice()) {
                Ok(window) => window,
                Err(e) => {
                    return AgentState::Failed(FailureReason::ContextOverflow {
                        required: e.required,
                        budget: e.budget,
                    });
                }
            };

            let remaining = wall_clock.saturating_sub(started.elapsed());
            let planner_limit = self.config.planner_timeout().min(remaining);
            let decision = tokio::select! {
                _ = self.cancel.cancelled() => return AgentState::Failed(FailureReason::Cancelled),
                decision = tokio::time::timeout(planner_limit, self.planner.next_action(&window, &catalog)) => {
                    decision.unwrap_or(Err(PlannerError::Timeout))
                }
            };
            feedback.clear();

            let request = match decision {
                Ok(PlannerDecision::Complete { summary }) => return AgentState::Completed { summary },
                Ok(PlannerDecision::Act(request)) => request,
                Err(PlannerError::Malformed(message)) => {
                    warn!(error = %message, "Malformed planner reply");
                    feedback.push(format!("Your last reply was not a valid action: {}", message));
                    if let Some(failed) = self.count_malformed(counters) {
                        return failed;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Planner call failed");
                    if e == PlannerError::Timeout && planner_limit < self.config.planner_timeout() {
                        return AgentState::Failed(FailureReason::WallClock { limit: wall_clock });
                    }
                    if let Some(failed) = self.count_failure(counters) {
                        return failed;
                    }
                    continue;
                }
            };

            // Validating
            self.transition(&AgentState::Validating, counters);
            if let Err(e) = self.registry.validate(&request, Some(&snapshot)) {
                info!(action = %request.name, error = %e, "Rejected planner request");
                feedback.push(e.to_string());
                if let Some(failed) = self.count_malformed(counters) {
                    return failed;
                }
                continue;
            }
            counters.malformed = 0;

            // Executing
            if self.cancel.is_cancelled() {
                return AgentState::Failed(FailureReason::Cancelled);
            }
            // Completion on the last allowed step is still reachable above
            if counters.steps_executed >= step_limit {
                return AgentState::Failed(FailureReason::StepLimit { limit: step_limit });
            }
            self.transition(&AgentState::Executing, counters);
            let result = match self.registry.invoke(&request, &mut self.page).await {
                Ok(result) => result,
                Err(e) => {
                    feedback.push(e.to_string());
                    if let Some(failed) = self.count_malformed(counters) {
                        return failed;
                    }
                    continue;
                }
            };
            counters.steps_executed += 1;

            // Observing
            self.transition(&AgentState::Observing, counters);
            if !result.success {
                feedback.push(format!("{} {}", request.name, result.describe()));
            }
            let success = result.success;
            self.observe(history, counters.steps_executed, snapshot, request, result);

            if success {
                counters.consecutive_failures = 0;
            } else if let Some(failed) = self.count_failure(counters) {
                return failed;
            }
        }
    }

    fn observe(
        &self,
        history: &mut HistoryTracker,
        step: u32,
        before: Arc<Snapshot>,
        request: ActionRequest,
        result: ActionResult,
    ) {
        let entry = history.record(HistoryEntry::new(step, before, request, result));
        info!(
            step,
            action = %entry.request.name,
            success = entry.success(),
            latency_ms = entry.result.latency.as_millis() as u64,
            url = entry.url_after().unwrap_or_else(|| entry.url_before()),
            "Step recorded"
        );
    }

    fn transition(&self, state: &AgentState, counters: &Counters) {
        debug!(
            state = state.name(),
            steps = counters.steps_executed,
            consecutive_failures = counters.consecutive_failures,
            "State transition"
        );
    }

    fn count_failure(&self, counters: &mut Counters) -> Option<AgentState> {
        counters.consecutive_failures += 1;
        (counters.consecutive_failures > self.config.max_consecutive_failures).then(|| {
            AgentState::Failed(FailureReason::ConsecutiveFailures {
                count: counters.consecutive_failures,
            })
        })
    }

    /// Invalid requests count towards both limits
    fn count_malformed(&self, counters: &mut Counters) -> Option<AgentState> {
        counters.malformed += 1;
        if counters.malformed > self.config.max_malformed_requests {
            return Some(AgentState::Failed(FailureReason::MalformedRequests {
                count: counters.malformed,
            }));
        }
        self.count_failure(counters)
    }
}
