//! Token-budgeted planner context

use serde::Serialize;

/// Rough token count: ~3 chars/token for code or JSON-like text, ~4 for prose, plus 10%
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for(text.len(), is_code_like(text))
}

/// Code-like text packs fewer characters per token
pub(crate) fn is_code_like(text: &str) -> bool {
    text.contains('{') || text.contains("```") || text.contains("fn ") || text.contains("[\"")
}

/// Estimate for `chars` bytes of text, plus 10%
pub(crate) fn tokens_for(chars: usize, code_like: bool) -> usize {
    if chars == 0 {
        return 0;
    }
    let chars_per_token = if code_like { 3 } else { 4 };
    (chars * 11).div_ceil(chars_per_token * 10)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Instructions,
    /// Condensed older steps
    Digest,
    History,
    Snapshot,
    Feedback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    pub tokens: usize,
}

impl ContextMessage {
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            role,
            kind,
            content,
            tokens,
        }
    }
}

/// Ordered messages for one planner call. Built only by the context manager.
#[derive(Debug, Clone, Serialize)]
pub struct ContextWindow {
    messages: Vec<ContextMessage>,
    budget: usize,
    threshold: f32,
    used: usize,
}

impl ContextWindow {
    pub(crate) fn new(messages: Vec<ContextMessage>, budget: usize, threshold: f32) -> Self {
        let used = messages.iter().map(|m| m.tokens).sum();
        Self {
            messages,
            budget,
            threshold,
            used,
        }
    }

    pub fn messages(&self) -> &[ContextMessage] {
        &self.messages
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Estimated tokens across all messages
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn of_kind(&self, kind: MessageKind) -> impl Iterator<Item = &ContextMessage> {
        self.messages.iter().filter(move |m| m.kind == kind)
    }

    /// System-role content joined with blank lines
    pub fn system_prompt(&self) -> String {
        self.join(Role::System)
    }

    /// User-role content joined with blank lines
    pub fn user_prompt(&self) -> String {
        self.join(Role::User)
    }

    fn join(&self, role: Role) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_prose_vs_code() {
        assert_eq!(estimate_tokens(""), 0);
        // 40 chars of prose: 40 / 4 * 1.1 = 11
        assert_eq!(estimate_tokens(&"a".repeat(40)), 11);
        // 40 chars of JSON: ceil(40 / 3 * 1.1) = 15
        let json = format!("{{{}}}", "a".repeat(38));
        assert_eq!(estimate_tokens(&json), 15);
    }

    #[test]
    fn test_window_accounting() {
        let window = ContextWindow::new(
            vec![
                ContextMessage::new(Role::System, MessageKind::Instructions, "a".repeat(40)),
                ContextMessage::new(Role::User, MessageKind::Snapshot, "b".repeat(80)),
            ],
            100,
            0.8,
        );
        assert_eq!(window.used(), 11 + 22);
        assert_eq!(window.of_kind(MessageKind::Snapshot).count(), 1);
        assert_eq!(window.system_prompt(), "a".repeat(40));
    }
}
