//! Interactivity classification

use crate::driver::RawNode;

use super::node::Interactivity;

/// Subtrees that never contribute to the page model
pub const PRUNED_TAGS: &[&str] = &["script", "style", "noscript", "template", "meta", "link", "head"];

const CLICKABLE_TAGS: &[&str] = &["a", "button", "select", "option", "summary", "details", "label"];

const CLICKABLE_ROLES: &[&str] = &[
    "button",
    "link",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "radio",
    "checkbox",
    "switch",
    "tab",
    "treeitem",
    "combobox",
];

const TYPABLE_ROLES: &[&str] = &["textbox", "searchbox", "spinbutton"];

/// `<input type=...>` values that accept text
const TEXT_INPUT_TYPES: &[&str] = &[
    "text", "search", "email", "password", "tel", "url", "number", "date", "datetime-local", "month",
    "time", "week",
];

pub fn is_pruned_tag(tag: &str) -> bool {
    PRUNED_TAGS.contains(&tag)
}

/// Layout gate: only rendered, unobscured elements with area can be acted on
pub fn is_actionable_layout(node: &RawNode) -> bool {
    node.visible && !node.obscured && node.rect.area() > 0.0
}

fn has_pointer_cursor(node: &RawNode) -> bool {
    node.cursor.as_deref() == Some("pointer")
}

/// Classify one node.
///
/// `inherits_pointer` is true when the nearest interactive ancestor already
/// shows a pointer cursor, in which case this node's pointer cursor carries
/// no signal of its own.
pub fn classify(node: &RawNode, inherits_pointer: bool) -> Interactivity {
    if !is_actionable_layout(node) {
        return Interactivity::default();
    }

    if node.attributes.contains_key("disabled") || node.attr("aria-disabled") == Some("true") {
        return Interactivity::default();
    }

    let tag = node.tag.as_str();
    let role = node.role.as_deref().or_else(|| node.attr("role"));

    if tag == "input" {
        let input_type = node.attr("type").unwrap_or("text").to_lowercase();
        if input_type == "hidden" {
            return Interactivity::default();
        }
        let typable = TEXT_INPUT_TYPES.contains(&input_type.as_str());
        return Interactivity {
            clickable: !typable,
            typable,
            scrollable: false,
        };
    }

    let typable = tag == "textarea"
        || node.editable
        || node.attr("contenteditable").is_some_and(|v| v != "false")
        || role.is_some_and(|r| TYPABLE_ROLES.contains(&r));

    let tabbable = node
        .attr("tabindex")
        .and_then(|v| v.trim().parse::<i32>().ok())
        .is_some_and(|t| t >= 0);

    let clickable = CLICKABLE_TAGS.contains(&tag)
        || role.is_some_and(|r| CLICKABLE_ROLES.contains(&r))
        || node.attributes.contains_key("onclick")
        || (has_pointer_cursor(node) && !inherits_pointer)
        || (tabbable && !typable);

    Interactivity {
        clickable,
        typable,
        scrollable: node.scrollable,
    }
}

/// Whether descendants of `node` should treat a pointer cursor as inherited
pub fn passes_pointer(node: &RawNode, interactivity: &Interactivity, inherited: bool) -> bool {
    inherited || (interactivity.clickable && has_pointer_cursor(node))
}
