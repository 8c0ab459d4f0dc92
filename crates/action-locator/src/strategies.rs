//! Candidate generation: one strategy per locator kind plus the fallback
//! tiers used when no recorded locator matches anything.

use nexaura_core_types::{normalize_text, AnchorRelation, Locator, LocatorKind, Target};
use perceiver_structural::{is_visible, DomTree, NodeId, PerceiverError};
use tracing::debug;

use crate::capture::visible_text;
use crate::errors::LocatorError;

/// Tags searched by text lookups that carry no tag hint.
const TEXT_BEARING_TAGS: &[&str] = &[
    "a", "button", "input", "textarea", "select", "label", "div", "span", "li", "p", "h1", "h2",
    "h3", "h4", "h5", "h6",
];

/// Finds live nodes for one kind of recorded locator.
pub trait Strategy: Send + Sync {
    /// Candidate nodes in document order
    fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError>;

    /// Locator kind this strategy serves
    fn kind(&self) -> LocatorKind;

    /// Strategy name for logs
    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// `getElementById` semantics: at most one node.
pub struct IdStrategy;

impl Strategy for IdStrategy {
    fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError> {
        if locator.value.is_empty() {
            return Ok(Vec::new());
        }
        Ok(tree.element_by_id(&locator.value).into_iter().collect())
    }

    fn kind(&self) -> LocatorKind {
        LocatorKind::Id
    }
}

pub struct CssStrategy;

impl Strategy for CssStrategy {
    fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError> {
        if locator.value.trim().is_empty() {
            return Ok(Vec::new());
        }
        tree.query_selector_all(&locator.value)
            .map_err(|err| invalid(locator, err))
    }

    fn kind(&self) -> LocatorKind {
        LocatorKind::Css
    }
}

pub struct XPathStrategy;

impl Strategy for XPathStrategy {
    fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError> {
        if locator.value.trim().is_empty() {
            return Ok(Vec::new());
        }
        tree.xpath(&locator.value).map_err(|err| invalid(locator, err))
    }

    fn kind(&self) -> LocatorKind {
        LocatorKind::Xpath
    }
}

/// Elements carrying the role whose accessible label overlaps the recorded
/// name. An empty recorded name accepts every element with the role; an
/// empty live label never matches a non-empty name.
pub struct RoleStrategy;

impl Strategy for RoleStrategy {
    fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError> {
        let role = locator.role_name().trim().to_ascii_lowercase();
        if role.is_empty() {
            return Ok(Vec::new());
        }
        let name = normalize_text(locator.name.as_deref().unwrap_or_default());
        Ok(tree.query(&|node| {
            let has_role = tree
                .attribute(node, "role")
                .map(|value| {
                    value
                        .split_whitespace()
                        .any(|token| token.eq_ignore_ascii_case(&role))
                })
                .unwrap_or(false);
            if !has_role {
                return false;
            }
            if name.is_empty() {
                return true;
            }
            let label = tree
                .attribute(node, "aria-label")
                .map(|label| normalize_text(&label))
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| normalize_text(&visible_text(tree, node)));
            overlaps(&label, &name)
        }))
    }

    fn kind(&self) -> LocatorKind {
        LocatorKind::Role
    }
}

pub struct TextStrategy;

impl Strategy for TextStrategy {
    fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError> {
        Ok(query_by_text(tree, &locator.value, locator.tag.as_deref()))
    }

    fn kind(&self) -> LocatorKind {
        LocatorKind::Text
    }
}

/// Elements whose text overlaps `text` in either direction, restricted to
/// `tag_hint` when it names a concrete tag.
pub fn query_by_text(tree: &dyn DomTree, text: &str, tag_hint: Option<&str>) -> Vec<NodeId> {
    let wanted = normalize_text(text);
    if wanted.is_empty() {
        return Vec::new();
    }
    let hint = tag_hint
        .map(|tag| tag.trim().to_ascii_lowercase())
        .filter(|tag| !tag.is_empty() && tag != "*");
    tree.query(&|node| {
        let tag = tree.tag_name(node).unwrap_or_default().to_ascii_lowercase();
        let tag_ok = match &hint {
            Some(hint) => &tag == hint,
            None => TEXT_BEARING_TAGS.contains(&tag.as_str()),
        };
        if !tag_ok {
            return false;
        }
        let mut label = normalize_text(&visible_text(tree, node));
        if label.is_empty() {
            label = tree.value(node).map(|v| normalize_text(&v)).unwrap_or_default();
        }
        overlaps(&label, &wanted)
    })
}

fn overlaps(live: &str, recorded: &str) -> bool {
    !live.is_empty() && (live.contains(recorded) || recorded.contains(live))
}

fn invalid(locator: &Locator, err: PerceiverError) -> LocatorError {
    LocatorError::InvalidLocator {
        locator: locator.key(),
        reason: err.to_string(),
    }
}

/// All locator strategies, looked up by kind.
pub struct LocatorStrategies {
    id: IdStrategy,
    css: CssStrategy,
    role: RoleStrategy,
    text: TextStrategy,
    xpath: XPathStrategy,
}

impl Default for LocatorStrategies {
    fn default() -> Self {
        Self {
            id: IdStrategy,
            css: CssStrategy,
            role: RoleStrategy,
            text: TextStrategy,
            xpath: XPathStrategy,
        }
    }
}

impl LocatorStrategies {
    pub fn for_kind(&self, kind: LocatorKind) -> &dyn Strategy {
        match kind {
            LocatorKind::Id => &self.id,
            LocatorKind::Css => &self.css,
            LocatorKind::Role => &self.role,
            LocatorKind::Text => &self.text,
            LocatorKind::Xpath => &self.xpath,
        }
    }

    pub fn find(&self, tree: &dyn DomTree, locator: &Locator) -> Result<Vec<NodeId>, LocatorError> {
        let strategy = self.for_kind(locator.kind);
        let nodes = strategy.find(tree, locator)?;
        debug!(
            target: "action-locator::strategies",
            strategy = strategy.name(),
            locator = %locator.value,
            hits = nodes.len(),
            "locator evaluated"
        );
        Ok(nodes)
    }
}

/// Replays the recorded ancestor trail from `<body>` by tag and same-tag
/// index (clamped to what exists), then returns the descendants of the
/// reached node that carry the recorded tag.
pub fn structural_trail(tree: &dyn DomTree, target: &Target) -> Vec<NodeId> {
    let trail = &target.context.ancestor_trail;
    if trail.is_empty() {
        return Vec::new();
    }
    let Some(root) = tree.document_element() else {
        return Vec::new();
    };
    let body = tree
        .children(root)
        .into_iter()
        .find(|child| tree.tag_name(*child).as_deref() == Some("body"))
        .unwrap_or(root);

    let mut current = body;
    for segment in trail
        .iter()
        .skip_while(|segment| matches!(segment.tag.as_str(), "html" | "body"))
    {
        let same_tag: Vec<NodeId> = tree
            .children(current)
            .into_iter()
            .filter(|child| tree.tag_name(*child).as_deref() == Some(segment.tag.as_str()))
            .collect();
        let Some(last) = same_tag.len().checked_sub(1) else {
            break;
        };
        current = same_tag[segment.index.min(last)];
    }

    let fingerprint = &target.fingerprint;
    tree.descendants(current)
        .into_iter()
        .filter(|node| {
            !fingerprint.has_known_tag()
                || tree.tag_name(*node).as_deref() == Some(fingerprint.tag.as_str())
        })
        .collect()
}

/// Text search for the recorded fingerprint text, any text-bearing tag.
pub fn fingerprint_text(tree: &dyn DomTree, target: &Target) -> Vec<NodeId> {
    match target.fingerprint.text() {
        Some(text) => query_by_text(tree, text, None),
        None => Vec::new(),
    }
}

/// Locates the target through its recorded relation anchor.
///
/// Anchor elements are the visible elements whose text contains the anchor
/// text and that have no descendant which also does. From each, in document
/// order, the target is looked up according to the recorded relation.
pub fn relation_anchor(tree: &dyn DomTree, target: &Target) -> Option<NodeId> {
    let anchor = target.anchor.as_ref()?;
    let text = normalize_text(&anchor.text);
    if text.is_empty() {
        return None;
    }
    let matches: Vec<NodeId> = tree.query(&|node| {
        normalize_text(&tree.text_content(node)).contains(&text) && is_visible(tree, node)
    });
    let tightest = matches.iter().copied().filter(|candidate| {
        !matches
            .iter()
            .any(|other| other != candidate && tree.contains(*candidate, *other))
    });

    let fingerprint = &target.fingerprint;
    let wanted = |node: &NodeId| {
        !fingerprint.has_known_tag() || tree.tag_name(*node).as_deref() == Some(fingerprint.tag.as_str())
    };

    for anchor_node in tightest {
        let is_label = tree.tag_name(anchor_node).as_deref() == Some("label");
        if anchor.relation == AnchorRelation::LabelFor && is_label {
            if let Some(control) = tree
                .attribute(anchor_node, "for")
                .and_then(|id| tree.element_by_id(&id))
            {
                return Some(control);
            }
        }
        let found = match anchor.relation {
            AnchorRelation::ParentSibling => tree.parent(anchor_node).and_then(|parent| {
                tree.descendants(parent)
                    .into_iter()
                    .filter(|node| !tree.contains(anchor_node, *node))
                    .find(|node| wanted(node))
            }),
            _ => tree.descendants(anchor_node).into_iter().find(|node| wanted(node)),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexaura_core_types::{AncestorSegment, Fingerprint, RelationAnchor};
    use perceiver_structural::{MemoryDom, NodeSpec};

    fn page() -> MemoryDom {
        MemoryDom::from_root(
            "https://app.example/",
            NodeSpec::new("html").rect(0.0, 0.0, 500.0, 500.0).child(
                NodeSpec::new("body").rect(0.0, 0.0, 500.0, 500.0).children([
                    NodeSpec::new("nav").rect(0.0, 0.0, 500.0, 40.0).children([
                        NodeSpec::new("a").attr("role", "link").attr("aria-label", "Home").rect(0.0, 0.0, 40.0, 20.0),
                        NodeSpec::new("a").attr("role", "link").text("Settings").rect(50.0, 0.0, 40.0, 20.0),
                    ]),
                    NodeSpec::new("form").rect(0.0, 50.0, 500.0, 200.0).children([
                        NodeSpec::new("div").rect(0.0, 50.0, 500.0, 40.0).children([
                            NodeSpec::new("label").attr("for", "q").text("Search term").rect(0.0, 50.0, 100.0, 20.0),
                            NodeSpec::new("input").id("q").rect(110.0, 50.0, 200.0, 20.0),
                        ]),
                        NodeSpec::new("div").rect(0.0, 100.0, 500.0, 40.0).children([
                            NodeSpec::new("span").text("Remember me").rect(0.0, 100.0, 100.0, 20.0),
                            NodeSpec::new("input").attr("type", "checkbox").rect(110.0, 100.0, 20.0, 20.0),
                        ]),
                        NodeSpec::new("button").text("Search").rect(0.0, 150.0, 80.0, 30.0),
                    ]),
                ]),
            ),
        )
        .unwrap()
    }

    #[test]
    fn role_lookup_uses_aria_label_then_text() {
        let dom = page();
        let home = RoleStrategy.find(&dom, &Locator::role("link", "home", 0.7)).unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(dom.attribute(home[0], "aria-label").as_deref(), Some("Home"));

        let any = RoleStrategy.find(&dom, &Locator::role("link", "", 0.7)).unwrap();
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn text_lookup_honours_tag_hint() {
        let dom = page();
        let all = query_by_text(&dom, "search", None);
        assert!(all.len() >= 2, "label and button both overlap");
        let buttons = query_by_text(&dom, "search", Some("button"));
        assert_eq!(buttons.len(), 1);
        assert!(query_by_text(&dom, "   ", None).is_empty());
    }

    #[test]
    fn invalid_selectors_become_locator_errors() {
        let dom = page();
        let err = CssStrategy.find(&dom, &Locator::css("div[", 0.5)).unwrap_err();
        assert!(matches!(err, LocatorError::InvalidLocator { .. }));
    }

    #[test]
    fn structural_trail_clamps_indices() {
        let dom = page();
        let mut target = Target::from_fingerprint(Fingerprint::new("input"));
        target.context.ancestor_trail = vec![
            AncestorSegment { tag: "html".into(), index: 0 },
            AncestorSegment { tag: "body".into(), index: 0 },
            AncestorSegment { tag: "form".into(), index: 0 },
            AncestorSegment { tag: "div".into(), index: 7 },
        ];
        let found = structural_trail(&dom, &target);
        assert_eq!(found.len(), 1);
        assert_eq!(dom.attribute(found[0], "type").as_deref(), Some("checkbox"));
    }

    #[test]
    fn label_anchor_resolves_through_for() {
        let dom = page();
        let mut target = Target::from_fingerprint(Fingerprint::new("input"));
        target.anchor = Some(RelationAnchor {
            text: "search term".into(),
            tag: Some("label".into()),
            relation: AnchorRelation::LabelFor,
        });
        assert_eq!(relation_anchor(&dom, &target), dom.by_id("q"));
    }

    #[test]
    fn sibling_anchor_searches_the_shared_parent() {
        let dom = page();
        let mut target = Target::from_fingerprint(Fingerprint::new("input"));
        target.anchor = Some(RelationAnchor {
            text: "remember me".into(),
            tag: Some("span".into()),
            relation: AnchorRelation::ParentSibling,
        });
        let found = relation_anchor(&dom, &target).unwrap();
        assert_eq!(dom.attribute(found, "type").as_deref(), Some("checkbox"));
    }
}
