//! Run state, task description, outcome and cancellation

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::dom::Snapshot;
use crate::history::HistoryEntry;

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    StepLimit { limit: u32 },
    WallClock { limit: Duration },
    ConsecutiveFailures { count: u32 },
    MalformedRequests { count: u32 },
    ContextOverflow { required: usize, budget: usize },
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StepLimit { limit } => write!(f, "step limit of {} reached", limit),
            FailureReason::WallClock { limit } => write!(f, "wall-clock budget of {:?} exceeded", limit),
            FailureReason::ConsecutiveFailures { count } => write!(f, "{} consecutive failures", count),
            FailureReason::MalformedRequests { count } => write!(f, "{} malformed planner requests in a row", count),
            FailureReason::ContextOverflow { required, budget } => {
                write!(f, "context needs {} tokens, budget is {}", required, budget)
            }
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    Planning,
    Validating,
    Executing,
    Observing,
    Completed { summary: String },
    Failed(FailureReason),
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Completed { .. } | AgentState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentState::Planning => "planning",
            AgentState::Validating => "validating",
            AgentState::Executing => "executing",
            AgentState::Observing => "observing",
            AgentState::Completed { .. } => "completed",
            AgentState::Failed(_) => "failed",
        }
    }
}

pub type SuccessPredicate = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// One task for the orchestrator
#[derive(Clone)]
pub struct TaskSpec {
    pub description: String,
    pub start_url: Option<String>,
    /// Checked against every fresh snapshot; `true` completes the run
    pub success_predicate: Option<SuccessPredicate>,
    /// Overrides the configured step limit
    pub step_limit: Option<u32>,
    /// Overrides the configured wall-clock budget
    pub wall_clock_limit: Option<Duration>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            start_url: None,
            success_predicate: None,
            step_limit: None,
            wall_clock_limit: None,
        }
    }

    pub fn start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = Some(url.into());
        self
    }

    pub fn success_when(mut self, predicate: impl Fn(&Snapshot) -> bool + Send + Sync + 'static) -> Self {
        self.success_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn step_limit(mut self, limit: u32) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn wall_clock_limit(mut self, limit: Duration) -> Self {
        self.wall_clock_limit = Some(limit);
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("description", &self.description)
            .field("start_url", &self.start_url)
            .field("success_predicate", &self.success_predicate.is_some())
            .field("step_limit", &self.step_limit)
            .field("wall_clock_limit", &self.wall_clock_limit)
            .finish()
    }
}

/// Terminal state plus everything that happened on the way
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: AgentState,
    pub history: Vec<Arc<HistoryEntry>>,
    pub steps_executed: u32,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.state, AgentState::Completed { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.state {
            AgentState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation shared between the caller and the orchestrator
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_cancelled());
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_set() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_task_spec_builder() {
        let task = TaskSpec::new("find the price")
            .start_url("https://shop.test")
            .step_limit(5)
            .success_when(|s| s.url().ends_with("/thanks"));

        assert_eq!(task.step_limit, Some(5));
        assert!(format!("{:?}", task).contains("success_predicate: true"));
        assert!(AgentState::Failed(FailureReason::Cancelled).is_terminal());
        assert!(!AgentState::Planning.is_terminal());
    }
}
