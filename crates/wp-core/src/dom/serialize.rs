//! Compact text rendering of a snapshot for the planner

use std::fmt::Write;

use super::node::{ElementNode, Snapshot};

/// Attributes worth showing to the planner, in display order
const SHOWN_ATTRIBUTES: &[&str] = &["type", "name", "placeholder", "aria-label", "title", "alt", "href"];

const MAX_ATTRIBUTE_CHARS: usize = 60;

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// One line per interactive element: `[index]<tag role=.. attrs> text`
pub fn render_element(node: &ElementNode, max_text: usize) -> String {
    let mut line = format!("[{}]<{}", node.index, node.tag);

    if let Some(role) = &node.role {
        let _ = write!(line, " role={}", role);
    }
    for key in SHOWN_ATTRIBUTES {
        if let Some(value) = node.attr(key).filter(|v| !v.is_empty()) {
            let _ = write!(line, " {}=\"{}\"", key, truncate(value, MAX_ATTRIBUTE_CHARS));
        }
    }
    line.push('>');

    let text = node.text.trim();
    if !text.is_empty() {
        line.push(' ');
        line.push_str(&truncate(text, max_text));
    }
    if node.interactivity.typable {
        line.push_str(" (typable)");
    }
    if node.interactivity.scrollable {
        line.push_str(" (scrollable)");
    }
    if !node.frame_path.is_root() {
        let _ = write!(line, " @frame[{}]", node.frame_path);
    }

    line
}

/// Page header plus the interactive elements; the full tree is never rendered
pub fn render_compact(snapshot: &Snapshot, max_text: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Current page: {}", snapshot.url());
    if !snapshot.title().is_empty() {
        let _ = writeln!(out, "Title: {}", snapshot.title());
    }
    out.push_str("Interactive elements:\n");

    let mut any = false;
    for node in snapshot.interactive() {
        out.push_str(&render_element(node, max_text));
        out.push('\n');
        any = true;
    }
    if !any {
        out.push_str("(no interactive elements)\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementIndex, Fingerprint, Interactivity};
    use crate::driver::{FramePath, Rect};
    use std::collections::BTreeMap;

    fn node(index: u32, tag: &str, text: &str) -> ElementNode {
        ElementNode {
            index: ElementIndex(index),
            tag: tag.to_string(),
            role: None,
            text: text.to_string(),
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            interactivity: Interactivity {
                clickable: true,
                ..Default::default()
            },
            frame_path: FramePath::root(),
            attributes: BTreeMap::new(),
            locator: String::new(),
            parent: None,
            depth: 0,
            fingerprint: Fingerprint(0),
        }
    }

    #[test]
    fn test_render_element() {
        let mut input = node(7, "input", "");
        input.interactivity = Interactivity {
            typable: true,
            ..Default::default()
        };
        input.attributes.insert("name".to_string(), "q".to_string());
        input.attributes.insert("class".to_string(), "big".to_string());
        input.frame_path = FramePath::root().child("search");

        assert_eq!(
            render_element(&input, 80),
            "[7]<input name=\"q\"> (typable) @frame[search]"
        );

        let mut tab = node(3, "div", "Settings");
        tab.role = Some("tab".to_string());
        assert_eq!(render_element(&tab, 80), "[3]<div role=tab> Settings");
    }

    #[test]
    fn test_long_text_is_truncated() {
        let long = "x".repeat(200);
        let line = render_element(&node(1, "a", &long), 10);
        assert_eq!(line, format!("[1]<a> {}...", "x".repeat(10)));
    }

    #[test]
    fn test_render_compact_lists_only_interactive() {
        let mut heading = node(0, "h1", "Welcome");
        heading.interactivity = Interactivity::default();
        let snapshot = Snapshot::new(
            1,
            "https://example.com",
            "Example",
            vec![heading, node(1, "button", "Next")],
        );

        let text = render_compact(&snapshot, 80);
        assert!(text.starts_with("Current page: https://example.com\nTitle: Example\n"));
        assert!(text.contains("[1]<button> Next"));
        assert!(!text.contains("Welcome"));

        let empty = Snapshot::new(2, "about:blank", "", vec![]);
        assert!(render_compact(&empty, 80).contains("(no interactive elements)"));
    }
}
