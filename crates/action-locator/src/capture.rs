//! Target capture: turns one live element into a self-contained [`Target`].
//!
//! Everything recorded here must be enough to find the element again on a
//! later visit, so capture is generous: several locators of decreasing
//! specificity, a fingerprint for scoring, structural context for the
//! fallback tiers and a relation anchor for label-driven lookups.

use nexaura_core_types::text::squash_whitespace;
use nexaura_core_types::{
    normalize_text, truncate_chars, AncestorSegment, AnchorRelation, Fingerprint, FrameInfo,
    Locator, NearbyAnchor, RelationAnchor, Target, TargetContext, VisionHint,
};
use perceiver_structural::selector::{escape_ident, is_plain_ident, quote_value};
use perceiver_structural::{is_visible, DomTree, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Knobs for [`capture_target`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Attributes that become `[attr="value"]` CSS locators
    pub test_attrs: Vec<String>,

    /// Fingerprint and anchor text are cut to this many characters
    pub max_text_chars: usize,

    /// Ancestors recorded in the structural trail
    pub max_ancestors: usize,

    /// Leading siblings recorded as nearby anchors
    pub max_nearby: usize,

    /// Levels the optimised selector may span
    pub selector_depth: usize,

    /// Levels of the nth-of-type structural path
    pub structural_depth: usize,

    /// Levels of the readable `tag.class` path
    pub css_path_depth: usize,

    /// Selector combinations tried before giving up
    pub max_selector_tries: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            test_attrs: crate::types::default_high_value_attrs(),
            max_text_chars: 300,
            max_ancestors: 6,
            max_nearby: 6,
            selector_depth: 5,
            structural_depth: 8,
            css_path_depth: 5,
            max_selector_tries: 5000,
        }
    }
}

const ANCHOR_SEARCH_DEPTH: usize = 4;
const CONTAINER_SEARCH_DEPTH: usize = 5;

/// Captures `node`; `None` when the handle is not an element.
pub fn capture_target<T: DomTree + ?Sized>(
    tree: &T,
    node: NodeId,
    frame: FrameInfo,
    options: &CaptureOptions,
) -> Option<Target> {
    if !tree.is_element(node) {
        return None;
    }
    let tag = tree.tag_name(node)?.to_ascii_lowercase();
    let display_text = squash_whitespace(&visible_text(tree, node));
    let text_filter = Some(display_text.clone()).filter(|t| !t.is_empty());
    let role = non_empty(tree.attribute(node, "role"));
    let aria_label = non_empty(tree.attribute(node, "aria-label"));

    let mut locators = Vec::new();

    if let Some(id) = tree.attribute(node, "id").filter(|id| is_stable_id(id)) {
        locators.push(Locator::id(id, 0.9));
    }

    for attr in &options.test_attrs {
        if let Some(value) = non_empty(tree.attribute(node, attr)) {
            locators.push(
                Locator::css(format!("[{}={}]", attr, quote_value(&value)), 0.85)
                    .with_text_filter(text_filter.clone()),
            );
        }
    }

    if let Some(role) = &role {
        locators.push(Locator::role(
            role.clone(),
            aria_label.clone().unwrap_or_default(),
            0.7,
        ));
    }

    if let Some(selector) = optimized_selector(tree, node, options) {
        locators.push(Locator::css(selector, 0.75).with_text_filter(text_filter.clone()));
    }

    let css_path = css_path(tree, node, options.css_path_depth);
    if !css_path.is_empty() {
        locators.push(Locator::css(css_path, 0.5).with_text_filter(text_filter.clone()));
    }

    locators.push(Locator::xpath(absolute_xpath(tree, node), 0.4));

    let text = truncate_chars(&normalize_text(&display_text), options.max_text_chars);
    if text.chars().count() >= 3 {
        locators.push(Locator::text(text.clone(), Some(tag.clone()), 1.0));
    }

    let mut fingerprint = Fingerprint::new(tag.clone());
    fingerprint.role = role;
    fingerprint.aria_label = aria_label;
    fingerprint.text = Some(text).filter(|t| !t.is_empty());
    for name in tree.attribute_names(node) {
        if name == "id" || name.starts_with("data-") {
            if let Some(value) = tree.attribute(node, &name) {
                fingerprint.attrs.insert(name, value);
            }
        }
    }
    fingerprint.class_tokens = class_tokens(tree, node).into_iter().collect();

    let context = TargetContext {
        ancestor_trail: ancestor_trail(tree, node, options.max_ancestors),
        sibling_index: tree.same_tag_index(node),
        nearby_anchors: nearby_anchors(tree, node, options.max_nearby),
        frame,
    };

    let dpr = device_pixel_ratio(tree);
    let vision = VisionHint {
        template_id: None,
        bbox: tree.bounding_box(node).map(|rect| rect.scaled(dpr)),
    };

    let anchor = stable_anchor(tree, node, options.max_text_chars);
    let container_anchor = container_heading(tree, node).map(|(heading, text)| RelationAnchor {
        text,
        tag: tree.tag_name(heading),
        relation: AnchorRelation::TextInside,
    });

    debug!(
        target: "action-locator::capture",
        tag = %tag,
        locators = locators.len(),
        anchored = anchor.is_some(),
        contained = container_anchor.is_some(),
        "captured target"
    );

    Some(Target {
        preferred_locators: locators,
        fingerprint,
        context,
        anchor,
        container_anchor,
        vision,
        history: Default::default(),
    })
}

/// Nearest heading-like element that labels the region `node` sits in.
///
/// Walks up to five ancestors; in each, the first heading in document order
/// that neither contains `node` nor repeats text already inside `node` wins.
/// Returns the heading and its normalized text.
pub fn container_heading<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> Option<(NodeId, String)> {
    let own_text = normalize_text(&visible_text(tree, node));
    let mut current = node;
    for _ in 0..CONTAINER_SEARCH_DEPTH {
        let parent = tree.parent(current)?;
        for heading in tree.descendants(parent) {
            if !is_heading_like(tree, heading) || tree.contains(heading, node) {
                continue;
            }
            let text = normalize_text(&visible_text(tree, heading));
            if text.chars().count() < 2 || own_text.contains(&text) {
                continue;
            }
            return Some((heading, text));
        }
        current = parent;
    }
    None
}

fn is_heading_like<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> bool {
    let tag = tree.tag_name(node).unwrap_or_default();
    if matches!(tag.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
        return true;
    }
    if tree.attribute(node, "role").as_deref() == Some("heading")
        || tree.attribute(node, "data-testid").as_deref() == Some("list-header")
    {
        return true;
    }
    tree.attribute(node, "class")
        .map(|class| class.contains("header") || class.contains("title"))
        .unwrap_or(false)
}

/// Rendered text, falling back to raw text content for hidden nodes.
pub(crate) fn visible_text<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> String {
    let inner = tree.inner_text(node);
    if inner.trim().is_empty() {
        tree.text_content(node)
    } else {
        inner
    }
}

/// Ids generated by frameworks (`:r1:`, `ember1234`) change between loads.
pub fn is_stable_id(id: &str) -> bool {
    if id.is_empty() || id.starts_with(':') {
        return false;
    }
    let mut run = 0;
    for c in id.chars() {
        if c.is_ascii_digit() {
            run += 1;
            if run >= 4 {
                return false;
            }
        } else {
            run = 0;
        }
    }
    true
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn device_pixel_ratio<T: DomTree + ?Sized>(tree: &T) -> f64 {
    let dpr = tree.device_pixel_ratio();
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

fn class_tokens<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> Vec<String> {
    tree.attribute(node, "class")
        .map(|class| class.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn tag_of<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> String {
    tree.tag_name(node).unwrap_or_default().to_ascii_lowercase()
}

fn is_root_like<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> bool {
    matches!(tag_of(tree, node).as_str(), "html" | "body")
}

/// Outermost first, at most `limit` entries.
fn ancestor_trail<T: DomTree + ?Sized>(tree: &T, node: NodeId, limit: usize) -> Vec<AncestorSegment> {
    let mut trail: Vec<AncestorSegment> = tree
        .ancestors(node)
        .into_iter()
        .take(limit)
        .map(|ancestor| AncestorSegment {
            tag: tag_of(tree, ancestor),
            index: tree.same_tag_index(ancestor),
        })
        .collect();
    trail.reverse();
    trail
}

fn nearby_anchors<T: DomTree + ?Sized>(tree: &T, node: NodeId, limit: usize) -> Vec<NearbyAnchor> {
    let Some(parent) = tree.parent(node) else {
        return Vec::new();
    };
    tree.children(parent)
        .into_iter()
        .take(limit)
        .enumerate()
        .filter(|(_, sibling)| *sibling != node)
        .map(|(offset, sibling)| NearbyAnchor {
            tag: tag_of(tree, sibling),
            text: normalize_text(&tree.text_content(sibling)),
            offset,
        })
        .collect()
}

/// `label[for]`, else a stable sibling, else a stable ancestor, searching
/// four levels up. The document root and body never count.
fn stable_anchor<T: DomTree + ?Sized>(tree: &T, node: NodeId, max_chars: usize) -> Option<RelationAnchor> {
    let stable_text = |candidate: NodeId| -> Option<String> {
        if !is_visible(tree, candidate) {
            return None;
        }
        let text = normalize_text(&tree.text_content(candidate));
        (text.chars().count() > 3).then(|| truncate_chars(&text, max_chars))
    };
    let anchor = |candidate: NodeId, text: String, relation| RelationAnchor {
        text,
        tag: Some(tag_of(tree, candidate)),
        relation,
    };

    if let Some(id) = non_empty(tree.attribute(node, "id")) {
        let labels = tree.query(&|n| {
            tag_of(tree, n) == "label" && tree.attribute(n, "for").as_deref() == Some(id.as_str())
        });
        if let Some(label) = labels.first() {
            if let Some(text) = stable_text(*label) {
                return Some(anchor(*label, text, AnchorRelation::LabelFor));
            }
        }
    }

    let mut current = node;
    for _ in 0..ANCHOR_SEARCH_DEPTH {
        let Some(parent) = tree.parent(current) else {
            break;
        };
        for sibling in tree.children(parent) {
            if sibling == current {
                continue;
            }
            if let Some(text) = stable_text(sibling) {
                return Some(anchor(sibling, text, AnchorRelation::ParentSibling));
            }
        }
        if is_root_like(tree, parent) {
            break;
        }
        if let Some(text) = stable_text(parent) {
            return Some(anchor(parent, text, AnchorRelation::Ancestor));
        }
        current = parent;
    }
    None
}

/// `/html[1]/body[1]/div[2]/button[1]` all the way from the root.
pub fn absolute_xpath<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> String {
    let mut parts: Vec<String> = std::iter::once(node)
        .chain(tree.ancestors(node))
        .map(|step| format!("{}[{}]", tag_of(tree, step), tree.same_tag_index(step) + 1))
        .collect();
    parts.reverse();
    format!("/{}", parts.join("/"))
}

/// Readable `div.card > button.primary.large` chain, stopping at an id.
pub fn css_path<T: DomTree + ?Sized>(tree: &T, node: NodeId, depth: usize) -> String {
    let mut parts = Vec::new();
    let mut current = Some(node);
    while let Some(step) = current {
        if parts.len() >= depth {
            break;
        }
        let mut part = tag_of(tree, step);
        if let Some(id) = non_empty(tree.attribute(step, "id")) {
            part.push('#');
            part.push_str(&escape_ident(&id));
            parts.push(part);
            break;
        }
        for class in class_tokens(tree, step).iter().take(2) {
            part.push('.');
            part.push_str(&escape_ident(class));
        }
        parts.push(part);
        current = tree.parent(step);
    }
    parts.reverse();
    parts.join(" > ")
}

/// `tag:nth-of-type(n)` chain up to `depth` levels, stopping below body.
pub fn structural_path<T: DomTree + ?Sized>(tree: &T, node: NodeId, depth: usize) -> String {
    let mut parts = Vec::new();
    let mut current = Some(node);
    while let Some(step) = current {
        if parts.len() >= depth || is_root_like(tree, step) {
            break;
        }
        parts.push(format!(
            "{}:nth-of-type({})",
            tag_of(tree, step),
            tree.same_tag_index(step) + 1
        ));
        current = tree.parent(step);
    }
    parts.reverse();
    parts.join(" > ")
}

/// Shortest unique child-combinator selector over the node and up to
/// `selector_depth - 1` ancestors. A lone single-token answer is replaced by
/// the structural path, since bare `tag.class` selectors rarely survive a
/// redesign.
fn optimized_selector<T: DomTree + ?Sized>(
    tree: &T,
    node: NodeId,
    options: &CaptureOptions,
) -> Option<String> {
    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut current = Some(node);
    while let Some(step) = current {
        if levels.len() >= options.selector_depth || is_root_like(tree, step) {
            break;
        }
        levels.push(level_tokens(tree, step));
        current = tree.parent(step);
    }

    let mut tries = 0usize;
    for depth in 1..=levels.len() {
        for combo in combinations(&levels[..depth]) {
            tries += 1;
            if tries > options.max_selector_tries {
                return None;
            }
            let selector = combo.join(" > ");
            let unique = tree
                .query_selector_all(&selector)
                .map(|hits| hits.len() == 1 && hits[0] == node)
                .unwrap_or(false);
            if unique {
                let single_token = depth == 1 && !selector.contains(":nth");
                if single_token {
                    let path = structural_path(tree, node, options.structural_depth);
                    return Some(path).filter(|p| !p.is_empty());
                }
                return Some(selector);
            }
        }
    }
    None
}

/// Candidate tokens for one element, most specific first.
fn level_tokens<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> Vec<String> {
    let tag = tag_of(tree, node);
    let mut tokens = Vec::new();
    if let Some(id) = tree.attribute(node, "id").filter(|id| is_stable_id(id)) {
        tokens.push(format!("#{}", escape_ident(&id)));
    }
    let mut names = tree.attribute_names(node);
    names.sort();
    for name in names {
        if !name.starts_with("data-") || !is_plain_ident(&name) {
            continue;
        }
        if let Some(value) = tree.attribute(node, &name).filter(|v| !v.is_empty() && v.len() <= 64) {
            tokens.push(format!("[{}={}]", name, quote_value(&value)));
        }
    }
    for class in class_tokens(tree, node) {
        let short_plain = class.len() <= 24
            && class
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && is_plain_ident(&class);
        if short_plain {
            tokens.push(format!("{}.{}", tag, class));
        }
    }
    tokens.push(tag.clone());
    tokens.push(format!("{}:nth-of-type({})", tag, tree.same_tag_index(node) + 1));
    tokens
}

/// Every outermost-first chain picking one token per level, cheapest first.
/// `levels[0]` is the element itself.
fn combinations(levels: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut combos: Vec<(usize, Vec<String>)> = vec![(0, Vec::new())];
    for level in levels.iter().rev() {
        let mut next = Vec::with_capacity(combos.len() * level.len());
        for (cost, prefix) in &combos {
            for (rank, token) in level.iter().enumerate() {
                let mut chain = prefix.clone();
                chain.push(token.clone());
                next.push((cost + rank, chain));
            }
        }
        combos = next;
    }
    combos.sort_by_key(|(cost, _)| *cost);
    combos.into_iter().map(|(_, chain)| chain).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexaura_core_types::LocatorKind;
    use perceiver_structural::{DocumentSnapshot, MemoryDom, NodeSpec};

    fn form_page() -> MemoryDom {
        MemoryDom::new(
            DocumentSnapshot::new(
                "https://shop.example/checkout",
                NodeSpec::new("html").rect(0.0, 0.0, 800.0, 600.0).child(
                    NodeSpec::new("body").rect(0.0, 0.0, 800.0, 600.0).children([
                        NodeSpec::new("section")
                            .class("panel")
                            .rect(0.0, 0.0, 800.0, 300.0)
                            .children([
                                NodeSpec::new("h2").text("Shipping").rect(0.0, 0.0, 200.0, 30.0),
                                NodeSpec::new("label")
                                    .attr("for", "email")
                                    .text("Email address")
                                    .rect(0.0, 40.0, 200.0, 20.0),
                                NodeSpec::new("input")
                                    .id("email")
                                    .attr("type", "email")
                                    .rect(0.0, 60.0, 200.0, 20.0),
                                NodeSpec::new("button")
                                    .attr("data-testid", "save")
                                    .class("btn primary")
                                    .text("Save address")
                                    .rect(0.0, 100.0, 120.0, 30.0),
                            ]),
                        NodeSpec::new("div").id("ember12345").text("noise").rect(0.0, 400.0, 10.0, 10.0),
                    ]),
                ),
            )
            .with_device_pixel_ratio(2.0),
        )
        .unwrap()
    }

    fn find(dom: &MemoryDom, selector: &str) -> NodeId {
        dom.query_selector_all(selector).unwrap()[0]
    }

    #[test]
    fn stable_ids_reject_generated_values() {
        assert!(is_stable_id("email"));
        assert!(is_stable_id("step-123"));
        assert!(!is_stable_id(""));
        assert!(!is_stable_id(":r1:"));
        assert!(!is_stable_id("ember12345"));
    }

    #[test]
    fn button_capture_records_every_tier() {
        let dom = form_page();
        let button = find(&dom, "button");
        let target = capture_target(&dom, button, FrameInfo::default(), &CaptureOptions::default()).unwrap();

        let kinds: Vec<LocatorKind> = target.preferred_locators.iter().map(|l| l.kind).collect();
        assert!(!kinds.contains(&LocatorKind::Id));
        assert!(kinds.contains(&LocatorKind::Xpath));

        let testid = &target.preferred_locators[0];
        assert_eq!(testid.value, "[data-testid=\"save\"]");
        assert_eq!(testid.confidence, 0.85);
        assert_eq!(testid.text_filter.as_deref(), Some("Save address"));

        let text = target
            .preferred_locators
            .iter()
            .find(|l| l.kind == LocatorKind::Text)
            .unwrap();
        assert_eq!(text.value, "save address");
        assert_eq!(text.tag.as_deref(), Some("button"));
        assert_eq!(text.confidence, 1.0);

        assert_eq!(target.fingerprint.tag, "button");
        assert_eq!(target.fingerprint.text.as_deref(), Some("save address"));
        assert_eq!(target.fingerprint.attrs.get("data-testid").map(String::as_str), Some("save"));
        assert!(target.fingerprint.class_tokens.contains("primary"));

        assert_eq!(target.vision.bbox.unwrap().width, 240.0);
        assert_eq!(
            target.context.ancestor_trail.iter().map(|s| s.tag.as_str()).collect::<Vec<_>>(),
            vec!["html", "body", "section"]
        );
        assert_eq!(target.container_text(), Some("shipping"));
    }

    #[test]
    fn every_generated_selector_finds_the_element() {
        let dom = form_page();
        let button = find(&dom, "button");
        let target = capture_target(&dom, button, FrameInfo::default(), &CaptureOptions::default()).unwrap();
        for locator in &target.preferred_locators {
            let hits = match locator.kind {
                LocatorKind::Css => dom.query_selector_all(&locator.value).unwrap(),
                LocatorKind::Xpath => dom.xpath(&locator.value).unwrap(),
                _ => continue,
            };
            assert!(hits.contains(&button), "{} missed", locator.value);
        }
    }

    #[test]
    fn labelled_input_gets_label_anchor_and_id_locator() {
        let dom = form_page();
        let input = find(&dom, "#email");
        let target = capture_target(&dom, input, FrameInfo::default(), &CaptureOptions::default()).unwrap();

        assert_eq!(target.preferred_locators[0], Locator::id("email", 0.9));
        let anchor = target.anchor.unwrap();
        assert_eq!(anchor.relation, AnchorRelation::LabelFor);
        assert_eq!(anchor.text, "email address");
        assert_eq!(anchor.tag.as_deref(), Some("label"));
    }

    #[test]
    fn unstable_ids_are_left_out() {
        let dom = form_page();
        let noisy = find(&dom, "div");
        let target = capture_target(&dom, noisy, FrameInfo::default(), &CaptureOptions::default()).unwrap();
        assert!(target.preferred_locators.iter().all(|l| l.kind != LocatorKind::Id));
        assert_eq!(target.fingerprint.attrs.get("id").map(String::as_str), Some("ember12345"));
    }

    #[test]
    fn structural_path_stops_below_body() {
        let dom = form_page();
        let button = find(&dom, "button");
        assert_eq!(
            structural_path(&dom, button, 8),
            "section:nth-of-type(1) > button:nth-of-type(1)"
        );
        assert_eq!(absolute_xpath(&dom, button), "/html[1]/body[1]/section[1]/button[1]");
        assert_eq!(css_path(&dom, button, 5), "html > body > section.panel > button.btn.primary");
    }

    #[test]
    fn container_heading_skips_headings_that_hold_the_node() {
        let dom = MemoryDom::from_root(
            "https://board.example/",
            NodeSpec::new("html").child(NodeSpec::new("body").children([
                NodeSpec::new("div").class("list").children([
                    NodeSpec::new("h3").text("Done"),
                    NodeSpec::new("a").class("card-title").text("Ship release"),
                ]),
            ])),
        )
        .unwrap();
        let card = find(&dom, "a");
        let (heading, text) = container_heading(&dom, card).unwrap();
        assert_eq!(dom.tag_name(heading).as_deref(), Some("h3"));
        assert_eq!(text, "done");
    }

    #[test]
    fn text_nodes_cannot_be_captured() {
        let dom = form_page();
        assert!(capture_target(&dom, NodeId(usize::MAX), FrameInfo::default(), &CaptureOptions::default()).is_none());
    }
}
