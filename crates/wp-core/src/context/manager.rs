//! Context assembly
//!
//! Each planner call gets a fresh [`ContextWindow`] built from the task, the
//! current snapshot, pending feedback and as much recent history as fits.
//! The snapshot is never dropped; history is evicted oldest-first and the
//! evicted steps are condensed into a single digest when it fits.

use thiserror::Error;
use tracing::debug;

use crate::config::ContextConfig;
use crate::dom::{Snapshot, render_compact};
use crate::history::HistoryTracker;

use super::window::{ContextMessage, ContextWindow, MessageKind, Role, is_code_like, tokens_for};

pub const DEFAULT_INSTRUCTIONS: &str = "\
You are a browser automation agent. Each turn you see the current page as a list of \
interactive elements written as [index]<tag> text, followed by your previous steps. \
Choose exactly one action per turn by calling one of the provided tools. Refer to elements \
only by their [index] from the current page. When the task is complete, call `done` with a \
short summary of the result.";

const MAX_DIGEST_URLS: usize = 10;

const HISTORY_HEADER: &str = "Previous steps:\n";

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Context overflow: task and page need {required} tokens, budget is {budget}")]
pub struct ContextOverflowError {
    pub required: usize,
    pub budget: usize,
}

pub struct ContextManager {
    config: ContextConfig,
    instructions: String,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assemble the planner input for the next step
    pub fn build(
        &self,
        history: &HistoryTracker,
        task: &str,
        snapshot: &Snapshot,
        feedback: &[String],
    ) -> Result<ContextWindow, ContextOverflowError> {
        let budget = self.config.token_budget;

        let instructions = ContextMessage::new(
            Role::System,
            MessageKind::Instructions,
            format!("{}\n\nTask: {}", self.instructions, task),
        );
        let page = ContextMessage::new(
            Role::User,
            MessageKind::Snapshot,
            render_compact(snapshot, self.config.max_element_text),
        );
        let feedback = (!feedback.is_empty()).then(|| {
            let lines: Vec<String> = feedback.iter().map(|f| format!("- {}", f)).collect();
            ContextMessage::new(
                Role::User,
                MessageKind::Feedback,
                format!("Feedback on your previous action:\n{}", lines.join("\n")),
            )
        });

        let required = instructions.tokens + page.tokens + feedback.as_ref().map_or(0, |f| f.tokens);
        if required > budget {
            return Err(ContextOverflowError { required, budget });
        }

        let soft_limit = ((budget as f64) * f64::from(self.config.summarization_threshold)) as usize;
        let (recent, evicted) = self.recent_history(history, soft_limit.saturating_sub(required));
        let mut used = required + recent.as_ref().map_or(0, |m| m.tokens);

        let digest = (evicted > 0)
            .then(|| digest(history, evicted))
            .filter(|d| used + d.tokens <= budget);
        if let Some(d) = &digest {
            used += d.tokens;
        }

        debug!(
            budget,
            used,
            history_kept = history.len() - evicted,
            history_evicted = evicted,
            digest = digest.is_some(),
            "Context assembled"
        );

        let mut messages = vec![instructions];
        messages.extend(digest);
        messages.extend(recent);
        messages.push(page);
        messages.extend(feedback);

        Ok(ContextWindow::new(messages, budget, self.config.summarization_threshold))
    }

    /// Newest entries that fit in `room` tokens, emitted oldest-first.
    /// Returns the message and the number of evicted (oldest) entries.
    fn recent_history(&self, history: &HistoryTracker, room: usize) -> (Option<ContextMessage>, usize) {
        let entries = history.entries();
        if entries.is_empty() {
            return (None, 0);
        }

        // Running totals for the header plus lines joined by newlines
        let mut chars = HISTORY_HEADER.len();
        let mut code_like = is_code_like(HISTORY_HEADER);
        let mut kept: Vec<String> = Vec::new();

        for entry in entries.iter().rev() {
            let line = entry.summary();
            let next_chars = chars + line.len() + usize::from(!kept.is_empty());
            let next_code_like = code_like || is_code_like(&line);
            if tokens_for(next_chars, next_code_like) > room {
                break;
            }
            chars = next_chars;
            code_like = next_code_like;
            kept.push(line);
        }

        if kept.is_empty() {
            return (None, entries.len());
        }

        let evicted = entries.len() - kept.len();
        kept.reverse();
        let content = format!("{}{}", HISTORY_HEADER, kept.join("\n"));
        (Some(ContextMessage::new(Role::User, MessageKind::History, content)), evicted)
    }
}

/// Condense the first `count` entries into counts and visited URLs
fn digest(history: &HistoryTracker, count: usize) -> ContextMessage {
    let entries = &history.entries()[..count];
    let succeeded = entries.iter().filter(|e| e.success()).count();

    let mut urls: Vec<&str> = Vec::new();
    for entry in entries {
        for url in std::iter::once(entry.url_before()).chain(entry.url_after()) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls.truncate(MAX_DIGEST_URLS);

    let (first, last) = (entries[0].step, entries[count - 1].step);
    let content = format!(
        "Earlier steps #{}-#{} (condensed): {} actions, {} succeeded, {} failed. Visited: {}",
        first,
        last,
        count,
        succeeded,
        count - succeeded,
        urls.join(", ")
    );

    ContextMessage::new(Role::User, MessageKind::Digest, content)
}
