use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value};

use crate::dom::{DomTree, NodeId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgeReport {
    pub ok: bool,
    pub reason: String,
    pub facts: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgePolicy {
    pub minimum_visible_area: Option<f64>,
    pub minimum_opacity: Option<f64>,
    pub pointer_events_block: bool,
}

/// Rendered with a non-empty box. Mirrors what a user could actually see:
/// display, visibility and opacity all count.
pub fn visible<T: DomTree + ?Sized>(tree: &T, node: NodeId, policy: &JudgePolicy) -> JudgeReport {
    let mut facts = JsonMap::new();
    let mut issues: Vec<String> = Vec::new();

    if !tree.is_element(node) {
        return JudgeReport {
            ok: false,
            reason: format_reason("not_visible", &["not_element".to_string()]),
            facts: Value::Object(facts),
        };
    }

    match tree.bounding_box(node) {
        Some(rect) => {
            facts.insert(
                "geometry".into(),
                json!({
                    "x": rect.x,
                    "y": rect.y,
                    "width": rect.width,
                    "height": rect.height,
                }),
            );
            if !rect.has_area() {
                issues.push("zero_area".into());
            }
            if let Some(min_area) = policy.minimum_visible_area {
                if rect.area() < min_area {
                    issues.push(format!("area<{:.0}", min_area));
                }
            }
        }
        None => issues.push("missing_geometry".into()),
    }

    if tree.attribute(node, "hidden").is_some() {
        issues.push("hidden_attribute".into());
    }

    let style = tree.computed_style(node);
    if style.display.eq_ignore_ascii_case("none") {
        issues.push("display:none".into());
    }
    if style.visibility.eq_ignore_ascii_case("hidden") {
        issues.push("visibility:hidden".into());
    }
    if style.opacity <= 0.0 {
        issues.push("opacity_zero".into());
    } else if let Some(min_opacity) = policy.minimum_opacity {
        if style.opacity < min_opacity {
            issues.push(format!("opacity<{:.2}", min_opacity));
        }
    }
    facts.insert("opacity".into(), json!(style.opacity));

    let ok = issues.is_empty();
    if !ok {
        facts.insert("issues".into(), json!(issues.clone()));
    }
    JudgeReport {
        ok,
        reason: format_reason(if ok { "visible" } else { "not_visible" }, &issues),
        facts: Value::Object(facts),
    }
}

pub fn is_visible<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> bool {
    visible(tree, node, &JudgePolicy::default()).ok
}

/// Whether the element looks like something a click is meant for.
/// Visibility is reported in the facts but does not decide the verdict;
/// callers combine the two as needed.
pub fn clickable<T: DomTree + ?Sized>(tree: &T, node: NodeId, policy: &JudgePolicy) -> JudgeReport {
    let mut facts = JsonMap::new();
    let mut issues: Vec<String> = Vec::new();

    let tag = tree.tag_name(node).unwrap_or_default();
    let roles = roles(tree, node);
    let input_type = tree
        .attribute(node, "type")
        .map(|t| t.trim().to_ascii_lowercase());

    let actionable_node = matches!(tag.as_str(), "button" | "a" | "area" | "summary" | "select" | "label");
    let actionable_input = tag == "input"
        && matches!(
            input_type.as_deref(),
            Some("submit" | "button" | "reset" | "checkbox" | "radio" | "image")
        );
    let actionable_role = roles.iter().any(|role| {
        matches!(
            role.as_str(),
            "button" | "link" | "menuitem" | "tab" | "checkbox" | "radio" | "option" | "switch"
        )
    });
    let has_href = tree.attribute(node, "href").is_some();
    let has_onclick = tree.attribute(node, "onclick").is_some();
    let focusable = tree
        .attribute(node, "tabindex")
        .and_then(|v| v.trim().parse::<i32>().ok())
        .map(|v| v >= 0)
        .unwrap_or(false);

    let style = tree.computed_style(node);
    let pointer_blocked = style.pointer_events.eq_ignore_ascii_case("none");
    if pointer_blocked && policy.pointer_events_block {
        issues.push("pointer_events_none".into());
    }
    let disabled = is_disabled(tree, node);
    if disabled {
        issues.push("disabled".into());
    }

    let actionable = actionable_node
        || actionable_input
        || actionable_role
        || has_href
        || has_onclick
        || focusable;
    if !actionable {
        issues.push("no_click_signal".into());
    }

    let ok = actionable && !disabled && !(pointer_blocked && policy.pointer_events_block);
    facts.insert(
        "node".into(),
        json!({
            "tag": tag,
            "roles": roles,
            "signals": {
                "actionable_node": actionable_node,
                "actionable_input": actionable_input,
                "actionable_role": actionable_role,
                "has_href": has_href,
                "has_onclick": has_onclick,
                "focusable": focusable,
                "pointer_blocked": pointer_blocked,
            }
        }),
    );
    facts.insert(
        "visibility".into(),
        visible(tree, node, &JudgePolicy::default()).facts,
    );
    if !issues.is_empty() {
        facts.insert("issues".into(), json!(issues.clone()));
    }
    JudgeReport {
        ok,
        reason: format_reason(if ok { "clickable" } else { "not_clickable" }, &issues),
        facts: Value::Object(facts),
    }
}

/// Text-entry controls: textareas, editable inputs, textbox roles and
/// contenteditable hosts.
pub fn is_text_input<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> bool {
    let tag = tree.tag_name(node).unwrap_or_default();
    match tag.as_str() {
        "textarea" => true,
        "input" => !matches!(
            tree.attribute(node, "type")
                .map(|t| t.trim().to_ascii_lowercase())
                .as_deref(),
            Some("submit" | "button" | "reset" | "checkbox" | "radio" | "image" | "hidden")
        ),
        _ => {
            roles(tree, node).iter().any(|role| role == "textbox")
                || tree
                    .attribute(node, "contenteditable")
                    .map(|v| v.is_empty() || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false)
        }
    }
}

fn roles<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> Vec<String> {
    let mut accumulator = BTreeSet::new();
    if let Some(role_value) = tree.attribute(node, "role") {
        for role in role_value.split_whitespace() {
            accumulator.insert(role.to_lowercase());
        }
    }
    accumulator.into_iter().collect()
}

fn is_disabled<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> bool {
    tree.attribute(node, "disabled").is_some()
        || tree
            .attribute(node, "aria-disabled")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

fn format_reason(base: &str, issues: &[String]) -> String {
    if issues.is_empty() {
        base.to_string()
    } else {
        format!("{}({})", base, issues.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDom, NodeSpec};

    fn page(children: Vec<NodeSpec>) -> MemoryDom {
        MemoryDom::from_root(
            "https://judge.example",
            NodeSpec::new("html").child(NodeSpec::new("body").children(children)),
        )
        .unwrap()
    }

    fn first(dom: &MemoryDom, selector: &str) -> NodeId {
        dom.query_selector_all(selector).unwrap()[0]
    }

    #[test]
    fn visible_requires_area_and_style() {
        let dom = page(vec![
            NodeSpec::new("button").id("ok").rect(0.0, 0.0, 80.0, 20.0),
            NodeSpec::new("button").id("flat").rect(0.0, 0.0, 80.0, 0.0),
            NodeSpec::new("button").id("ghost").opacity(0.0).rect(0.0, 0.0, 80.0, 20.0),
            NodeSpec::new("button").id("veiled").visibility("hidden").rect(0.0, 0.0, 80.0, 20.0),
            NodeSpec::new("button").id("norect"),
        ]);
        assert!(is_visible(&dom, first(&dom, "#ok")));
        let flat = visible(&dom, first(&dom, "#flat"), &JudgePolicy::default());
        assert!(!flat.ok);
        assert!(flat.reason.contains("zero_area"));
        assert!(!is_visible(&dom, first(&dom, "#ghost")));
        assert!(!is_visible(&dom, first(&dom, "#veiled")));
        assert!(!is_visible(&dom, first(&dom, "#norect")));
    }

    #[test]
    fn hidden_attribute_counts() {
        let dom = page(vec![NodeSpec::new("div")
            .attr("hidden", "")
            .rect(0.0, 0.0, 10.0, 10.0)]);
        let report = visible(&dom, first(&dom, "div"), &JudgePolicy::default());
        assert!(!report.ok);
        assert!(report.reason.contains("hidden_attribute"));
    }

    #[test]
    fn clickable_requires_actionable_signal() {
        let dom = page(vec![
            NodeSpec::new("div").id("plain"),
            NodeSpec::new("div").id("role").attr("role", "button"),
            NodeSpec::new("a").id("link").attr("href", "/next"),
            NodeSpec::new("input").id("submit").attr("type", "submit"),
            NodeSpec::new("input").id("text"),
            NodeSpec::new("button").id("off").attr("disabled", ""),
        ]);
        let policy = JudgePolicy::default();
        assert!(!clickable(&dom, first(&dom, "#plain"), &policy).ok);
        assert!(clickable(&dom, first(&dom, "#role"), &policy).ok);
        assert!(clickable(&dom, first(&dom, "#link"), &policy).ok);
        assert!(clickable(&dom, first(&dom, "#submit"), &policy).ok);
        assert!(!clickable(&dom, first(&dom, "#text"), &policy).ok);
        let off = clickable(&dom, first(&dom, "#off"), &policy);
        assert!(!off.ok);
        assert!(off.reason.contains("disabled"));
    }

    #[test]
    fn pointer_events_only_block_under_policy() {
        let dom = page(vec![NodeSpec::new("button").pointer_events("none")]);
        let node = first(&dom, "button");
        assert!(clickable(&dom, node, &JudgePolicy::default()).ok);
        let strict = JudgePolicy {
            pointer_events_block: true,
            ..JudgePolicy::default()
        };
        assert!(!clickable(&dom, node, &strict).ok);
    }

    #[test]
    fn text_inputs() {
        let dom = page(vec![
            NodeSpec::new("input").id("name"),
            NodeSpec::new("input").id("go").attr("type", "button"),
            NodeSpec::new("div").id("editor").attr("contenteditable", "true"),
            NodeSpec::new("textarea").id("notes"),
        ]);
        assert!(is_text_input(&dom, first(&dom, "#name")));
        assert!(!is_text_input(&dom, first(&dom, "#go")));
        assert!(is_text_input(&dom, first(&dom, "#editor")));
        assert!(is_text_input(&dom, first(&dom, "#notes")));
    }

    #[test]
    fn aria_disabled_blocks_clicks() {
        let dom = page(vec![NodeSpec::new("button").attr("aria-disabled", "true")]);
        let report = clickable(&dom, first(&dom, "button"), &JudgePolicy::default());
        assert!(!report.ok);
        assert!(report.reason.contains("disabled"));
    }
}
