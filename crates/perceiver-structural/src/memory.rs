//! In-memory document built from a serialisable snapshot.
//!
//! Snapshots are what the CLI reads from disk and what every test builds
//! through the [`NodeSpec`] builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use nexaura_core_types::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::dom::{ComputedStyle, DomTree, NodeId};
use crate::errors::PerceiverError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_dpr")]
    pub device_pixel_ratio: f64,
    pub root: NodeSpec,
}

fn default_dpr() -> f64 {
    1.0
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSpec {
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub pointer_events: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSpec {
    #[serde(default)]
    pub cross_origin: bool,
    #[serde(default)]
    pub document: Option<Box<DocumentSnapshot>>,
}

/// Child of an element: bare strings are text nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChildSpec {
    Text(String),
    Element(NodeSpec),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
    #[serde(default)]
    pub rect: Option<BoundingBox>,
    #[serde(default)]
    pub style: StyleSpec,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub frame: Option<FrameSpec>,
}

impl NodeSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(ChildSpec::Text(text.into()));
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(ChildSpec::Element(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children
            .extend(children.into_iter().map(ChildSpec::Element));
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Some(BoundingBox::new(x, y, width, height));
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.style.display = Some(display.into());
        self
    }

    pub fn visibility(mut self, visibility: impl Into<String>) -> Self {
        self.style.visibility = Some(visibility.into());
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.style.opacity = Some(opacity);
        self
    }

    pub fn pointer_events(mut self, value: impl Into<String>) -> Self {
        self.style.pointer_events = Some(value.into());
        self
    }

    pub fn frame_document(mut self, document: DocumentSnapshot) -> Self {
        self.frame = Some(FrameSpec {
            cross_origin: false,
            document: Some(Box::new(document)),
        });
        self
    }

    pub fn cross_origin_frame(mut self) -> Self {
        self.frame = Some(FrameSpec {
            cross_origin: true,
            document: None,
        });
        self
    }
}

impl DocumentSnapshot {
    pub fn new(url: impl Into<String>, root: NodeSpec) -> Self {
        Self {
            url: Some(url.into()),
            device_pixel_ratio: 1.0,
            root,
        }
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f64) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }
}

enum FrameContent {
    CrossOrigin(Option<String>),
    Document(Arc<MemoryDom>),
}

struct ElementData {
    tag: String,
    attrs: BTreeMap<String, String>,
    rect: Option<BoundingBox>,
    style: StyleSpec,
    value: Option<String>,
    frame: Option<FrameContent>,
}

enum NodeKind {
    Element(ElementData),
    Text(String),
}

struct Node {
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena-backed document. Node ids index the arena; text nodes share the
/// index space but are never handed out by element queries.
pub struct MemoryDom {
    nodes: Vec<Node>,
    url: Option<String>,
    dpr: f64,
}

impl MemoryDom {
    pub fn new(snapshot: DocumentSnapshot) -> Result<Self, PerceiverError> {
        if snapshot.root.tag.trim().is_empty() {
            return Err(PerceiverError::Snapshot("root element has no tag".into()));
        }
        let dpr = if snapshot.device_pixel_ratio.is_finite() && snapshot.device_pixel_ratio > 0.0 {
            snapshot.device_pixel_ratio
        } else {
            1.0
        };
        let mut dom = Self {
            nodes: Vec::new(),
            url: snapshot.url,
            dpr,
        };
        dom.insert_element(snapshot.root, None)?;
        Ok(dom)
    }

    pub fn from_root(url: impl Into<String>, root: NodeSpec) -> Result<Self, PerceiverError> {
        Self::new(DocumentSnapshot::new(url, root))
    }

    pub fn from_json(raw: &str) -> Result<Self, PerceiverError> {
        let snapshot: DocumentSnapshot =
            serde_json::from_str(raw).map_err(|err| PerceiverError::Snapshot(err.to_string()))?;
        Self::new(snapshot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First element carrying `id`; convenience for tests and the CLI.
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.element_by_id(id)
    }

    fn insert_element(&mut self, spec: NodeSpec, parent: Option<usize>) -> Result<usize, PerceiverError> {
        if spec.tag.trim().is_empty() {
            return Err(PerceiverError::Snapshot("element without tag".into()));
        }
        let index = self.nodes.len();
        let frame = match spec.frame {
            Some(frame) if frame.cross_origin => Some(FrameContent::CrossOrigin(
                spec.attrs.get("src").cloned(),
            )),
            Some(FrameSpec {
                document: Some(document),
                ..
            }) => Some(FrameContent::Document(Arc::new(MemoryDom::new(*document)?))),
            _ => None,
        };
        self.nodes.push(Node {
            kind: NodeKind::Element(ElementData {
                tag: spec.tag.to_ascii_lowercase(),
                attrs: spec.attrs,
                rect: spec.rect,
                style: spec.style,
                value: spec.value,
                frame,
            }),
            parent,
            children: Vec::new(),
        });
        for child in spec.children {
            let child_index = match child {
                ChildSpec::Text(text) => {
                    self.nodes.push(Node {
                        kind: NodeKind::Text(text),
                        parent: Some(index),
                        children: Vec::new(),
                    });
                    self.nodes.len() - 1
                }
                ChildSpec::Element(element) => self.insert_element(element, Some(index))?,
            };
            self.nodes[index].children.push(child_index);
        }
        Ok(index)
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.nodes.get(node.0).map(|n| &n.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    fn own_display_none(&self, index: usize) -> bool {
        match &self.nodes[index].kind {
            NodeKind::Element(data) => data
                .style
                .display
                .as_deref()
                .map(|d| d.trim().eq_ignore_ascii_case("none"))
                .unwrap_or(false),
            NodeKind::Text(_) => false,
        }
    }

    /// display:none anywhere on the path to the root removes the box.
    fn display_suppressed(&self, index: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if self.own_display_none(i) {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }

    fn inherited<F>(&self, index: usize, pick: F) -> Option<String>
    where
        F: Fn(&StyleSpec) -> Option<&String>,
    {
        let mut current = Some(index);
        while let Some(i) = current {
            if let NodeKind::Element(data) = &self.nodes[i].kind {
                if let Some(value) = pick(&data.style) {
                    return Some(value.clone());
                }
            }
            current = self.nodes[i].parent;
        }
        None
    }

    fn collect_text(&self, index: usize, rendered_only: bool, out: &mut Vec<String>) {
        let node = &self.nodes[index];
        match &node.kind {
            NodeKind::Text(text) => out.push(text.clone()),
            NodeKind::Element(data) => {
                if rendered_only {
                    let hidden = data
                        .style
                        .display
                        .as_deref()
                        .map(|d| d.eq_ignore_ascii_case("none"))
                        .unwrap_or(false)
                        || data
                            .style
                            .visibility
                            .as_deref()
                            .map(|v| v.eq_ignore_ascii_case("hidden"))
                            .unwrap_or(false)
                        || matches!(data.tag.as_str(), "script" | "style" | "template");
                    if hidden {
                        return;
                    }
                }
                for child in &node.children {
                    self.collect_text(*child, rendered_only, out);
                }
            }
        }
    }
}

impl DomTree for MemoryDom {
    fn document_element(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent).map(NodeId)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        match self.nodes.get(node.0) {
            Some(n) => n
                .children
                .iter()
                .filter(|child| matches!(self.nodes[**child].kind, NodeKind::Element(_)))
                .map(|child| NodeId(*child))
                .collect(),
            None => Vec::new(),
        }
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|data| data.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)
            .and_then(|data| data.attrs.get(name).cloned())
    }

    fn attribute_names(&self, node: NodeId) -> Vec<String> {
        self.element(node)
            .map(|data| data.attrs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn text_content(&self, node: NodeId) -> String {
        if node.0 >= self.nodes.len() {
            return String::new();
        }
        let mut parts = Vec::new();
        self.collect_text(node.0, false, &mut parts);
        parts.concat()
    }

    fn inner_text(&self, node: NodeId) -> String {
        if node.0 >= self.nodes.len() || self.display_suppressed(node.0) {
            return String::new();
        }
        let mut parts = Vec::new();
        self.collect_text(node.0, true, &mut parts);
        let joined = parts.join(" ");
        joined.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn value(&self, node: NodeId) -> Option<String> {
        let data = self.element(node)?;
        if let Some(value) = &data.value {
            return Some(value.clone());
        }
        match data.tag.as_str() {
            "input" | "textarea" | "select" | "button" | "option" => data.attrs.get("value").cloned(),
            _ => None,
        }
    }

    fn bounding_box(&self, node: NodeId) -> Option<BoundingBox> {
        let data = self.element(node)?;
        if self.display_suppressed(node.0) {
            return None;
        }
        data.rect
    }

    fn computed_style(&self, node: NodeId) -> ComputedStyle {
        let Some(data) = self.element(node) else {
            return ComputedStyle::default();
        };
        let defaults = ComputedStyle::default();
        let display = if self.display_suppressed(node.0) {
            "none".to_string()
        } else {
            data.style.display.clone().unwrap_or(defaults.display)
        };
        ComputedStyle {
            display,
            visibility: self
                .inherited(node.0, |style| style.visibility.as_ref())
                .unwrap_or(defaults.visibility),
            opacity: data.style.opacity.unwrap_or(defaults.opacity),
            pointer_events: self
                .inherited(node.0, |style| style.pointer_events.as_ref())
                .unwrap_or(defaults.pointer_events),
        }
    }

    fn location(&self) -> Option<String> {
        self.url.clone()
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    fn content_document(&self, node: NodeId) -> Result<Option<Arc<dyn DomTree>>, PerceiverError> {
        let Some(data) = self.element(node) else {
            return Ok(None);
        };
        if !matches!(data.tag.as_str(), "iframe" | "frame") {
            return Ok(None);
        }
        match &data.frame {
            Some(FrameContent::Document(document)) => {
                Ok(Some(Arc::clone(document) as Arc<dyn DomTree>))
            }
            Some(FrameContent::CrossOrigin(src)) => Err(PerceiverError::CrossOriginFrame(
                src.clone().unwrap_or_else(|| "<unknown>".to_string()),
            )),
            None => Ok(None),
        }
    }
}
