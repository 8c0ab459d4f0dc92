//! Read-only tree inspection capability.
//!
//! Every engine component talks to the page through [`DomTree`]. Handles are
//! opaque [`NodeId`]s that are only meaningful for the tree that produced
//! them; a foreign handle simply yields empty answers.

use std::sync::Arc;

use nexaura_core_types::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::errors::PerceiverError;
use crate::{selector, xpath};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Subset of the computed style the engine cares about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub pointer_events: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            pointer_events: "auto".to_string(),
        }
    }
}

impl ComputedStyle {
    pub fn is_rendered(&self) -> bool {
        !self.display.eq_ignore_ascii_case("none")
            && !self.visibility.eq_ignore_ascii_case("hidden")
            && self.opacity > 0.0
    }
}

pub trait DomTree: Send + Sync {
    fn document_element(&self) -> Option<NodeId>;

    /// Parent element; `None` for the document element and foreign handles.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element children in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn is_element(&self, node: NodeId) -> bool;

    /// Lowercase tag name.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn attribute_names(&self, node: NodeId) -> Vec<String>;

    /// Concatenation of every descendant text node, hidden or not.
    fn text_content(&self, node: NodeId) -> String;

    /// Rendered text: hidden subtrees are skipped.
    fn inner_text(&self, node: NodeId) -> String;

    /// Current form value for inputs, textareas and selects.
    fn value(&self, node: NodeId) -> Option<String>;

    /// Layout box in CSS pixels, `None` when the node is not rendered.
    fn bounding_box(&self, node: NodeId) -> Option<BoundingBox>;

    fn computed_style(&self, node: NodeId) -> ComputedStyle;

    fn location(&self) -> Option<String>;

    fn device_pixel_ratio(&self) -> f64;

    /// Document hosted by an `<iframe>`/`<frame>`. `Ok(None)` for any other
    /// element, an error when the frame belongs to another origin.
    fn content_document(&self, node: NodeId) -> Result<Option<Arc<dyn DomTree>>, PerceiverError>;

    fn query(&self, predicate: &dyn Fn(NodeId) -> bool) -> Vec<NodeId> {
        self.all_elements()
            .into_iter()
            .filter(|node| predicate(*node))
            .collect()
    }

    /// Element ancestors, nearest first.
    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent(parent);
        }
        out
    }

    /// Every element in document order, document element included.
    fn all_elements(&self) -> Vec<NodeId> {
        match self.document_element() {
            Some(root) => {
                let mut out = vec![root];
                out.extend(self.descendants(root));
                out
            }
            None => Vec::new(),
        }
    }

    /// Element descendants of `node` in document order, `node` excluded.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, PerceiverError> {
        let parsed = selector::parse(selector)?;
        Ok(self
            .all_elements()
            .into_iter()
            .filter(|node| parsed.matches(self, *node))
            .collect())
    }

    fn query_selector_within(
        &self,
        scope: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>, PerceiverError> {
        let parsed = selector::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|node| parsed.matches(self, *node))
            .collect())
    }

    fn xpath(&self, expression: &str) -> Result<Vec<NodeId>, PerceiverError> {
        xpath::evaluate(self, expression)
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.all_elements()
            .into_iter()
            .find(|node| self.attribute(*node, "id").as_deref() == Some(id))
    }

    /// Topmost rendered element under the point. Later elements in document
    /// order paint above earlier ones.
    fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId> {
        self.all_elements().into_iter().rev().find(|node| {
            self.computed_style(*node).is_rendered()
                && self
                    .bounding_box(*node)
                    .map(|rect| rect.has_area() && rect.contains_point(x, y))
                    .unwrap_or(false)
        })
    }

    /// True when `node` is `ancestor` or lies inside it.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return true;
        }
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Zero-based position among the parent's children with the same tag.
    fn same_tag_index(&self, node: NodeId) -> usize {
        let Some(parent) = self.parent(node) else {
            return 0;
        };
        let tag = self.tag_name(node);
        self.children(parent)
            .into_iter()
            .filter(|sibling| self.tag_name(*sibling) == tag)
            .position(|sibling| sibling == node)
            .unwrap_or(0)
    }

    /// Zero-based position among all element siblings.
    fn sibling_index(&self, node: NodeId) -> usize {
        self.parent(node)
            .and_then(|parent| {
                self.children(parent)
                    .into_iter()
                    .position(|sibling| sibling == node)
            })
            .unwrap_or(0)
    }
}
