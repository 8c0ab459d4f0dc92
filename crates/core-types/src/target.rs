//! The portable element description captured at record time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Tag recorded when the element kind is not known (legacy steps).
pub const UNKNOWN_TAG: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    Id,
    Css,
    Role,
    Text,
    Xpath,
}

impl LocatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorKind::Id => "id",
            LocatorKind::Css => "css",
            LocatorKind::Role => "role",
            LocatorKind::Text => "text",
            LocatorKind::Xpath => "xpath",
        }
    }
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One concrete search strategy with its recorded confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locator {
    #[serde(rename = "type")]
    pub kind: LocatorKind,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_filter: Option<String>,
}

fn default_confidence() -> f64 {
    0.5
}

impl Locator {
    pub fn new(kind: LocatorKind, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            value: value.into(),
            role: None,
            name: None,
            tag: None,
            confidence,
            text_filter: None,
        }
    }

    pub fn id(value: impl Into<String>, confidence: f64) -> Self {
        Self::new(LocatorKind::Id, value, confidence)
    }

    pub fn css(value: impl Into<String>, confidence: f64) -> Self {
        Self::new(LocatorKind::Css, value, confidence)
    }

    pub fn xpath(value: impl Into<String>, confidence: f64) -> Self {
        Self::new(LocatorKind::Xpath, value, confidence)
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>, confidence: f64) -> Self {
        let role = role.into();
        let mut locator = Self::new(LocatorKind::Role, role.clone(), confidence);
        locator.role = Some(role);
        locator.name = Some(name.into());
        locator
    }

    pub fn text(value: impl Into<String>, tag: Option<String>, confidence: f64) -> Self {
        let mut locator = Self::new(LocatorKind::Text, value, confidence);
        locator.tag = tag;
        locator
    }

    pub fn with_text_filter(mut self, filter: Option<String>) -> Self {
        self.text_filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    /// Role to query for; older recordings only filled `value`.
    pub fn role_name(&self) -> &str {
        self.role.as_deref().unwrap_or(&self.value)
    }

    /// Stable key used by the success history.
    pub fn key(&self) -> String {
        match self.kind {
            LocatorKind::Role => format!(
                "role:{}:{}",
                self.role_name(),
                self.name.as_deref().unwrap_or_default()
            ),
            kind => format!("{}:{}", kind.name(), self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub tag: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub class_tokens: BTreeSet<String>,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            tag: UNKNOWN_TAG.to_string(),
            role: None,
            aria_label: None,
            text: None,
            attrs: BTreeMap::new(),
            class_tokens: BTreeSet::new(),
        }
    }
}

impl Fingerprint {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn has_known_tag(&self) -> bool {
        !self.tag.is_empty() && self.tag != UNKNOWN_TAG
    }

    /// Recorded text, `None` when missing or blank.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn is_text_input(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                self.attrs.get("type").map(String::as_str),
                Some("submit" | "button" | "checkbox" | "radio" | "reset")
            ),
            _ => self.role.as_deref() == Some("textbox"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorSegment {
    pub tag: String,
    /// Position among the parent's children carrying the same tag.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearbyAnchor {
    pub tag: String,
    pub text: String,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
}

impl FrameInfo {
    pub fn new(id: impl Into<String>, href: Option<String>) -> Self {
        Self {
            id: Some(id.into()),
            href,
        }
    }

    /// Frames only disagree when both sides know their id.
    pub fn conflicts_with(&self, other: &FrameInfo) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetContext {
    /// Outermost ancestor first.
    #[serde(default)]
    pub ancestor_trail: Vec<AncestorSegment>,
    #[serde(default)]
    pub sibling_index: usize,
    #[serde(default)]
    pub nearby_anchors: Vec<NearbyAnchor>,
    #[serde(default)]
    pub frame: FrameInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorRelation {
    #[serde(rename = "label_for")]
    LabelFor,
    #[serde(rename = "parent_sibling")]
    ParentSibling,
    #[serde(rename = "ancestor")]
    Ancestor,
    #[serde(rename = "text-inside")]
    TextInside,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationAnchor {
    pub text: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub relation: AnchorRelation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionHint {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorHistory {
    #[serde(default)]
    pub last_successful_locator: Option<String>,
    #[serde(default)]
    pub success_counts: BTreeMap<String, u32>,
}

impl LocatorHistory {
    pub fn record_success(&mut self, locator_key: &str) {
        *self
            .success_counts
            .entry(locator_key.to_string())
            .or_insert(0) += 1;
        self.last_successful_locator = Some(locator_key.to_string());
    }

    pub fn successes(&self, locator_key: &str) -> u32 {
        self.success_counts.get(locator_key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub preferred_locators: Vec<Locator>,
    #[serde(default)]
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub context: TargetContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<RelationAnchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_anchor: Option<RelationAnchor>,
    #[serde(default)]
    pub vision: VisionHint,
    #[serde(default)]
    pub history: LocatorHistory,
}

impl Target {
    /// Fingerprint-only target; handy for hand-written guides.
    pub fn from_fingerprint(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            ..Self::default()
        }
    }

    pub fn container_text(&self) -> Option<&str> {
        self.container_anchor
            .as_ref()
            .map(|anchor| anchor.text.as_str())
            .filter(|text| !text.is_empty())
    }
}
