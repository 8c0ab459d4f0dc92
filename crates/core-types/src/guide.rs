//! Guide / step schema (v2) with migration from the legacy flat step format.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{FrameInfo, Locator, Target};
use crate::text::{normalize_text, slugify};

pub const GUIDE_VERSION: u32 = 2;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("guide name is empty")]
    EmptyName,
    #[error("guide shortcut '{0}' must start with '/' and not be empty")]
    InvalidShortcut(String),
    #[error("step {index} has no target tag")]
    MissingTag { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    #[default]
    Click,
    Type,
    Submit,
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Click => "click",
            StepAction::Type => "type",
            StepAction::Submit => "submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub step_number: u32,
    #[serde(default)]
    pub action: StepAction,
    #[serde(default)]
    pub instruction: String,
    /// Text typed by `type` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default = "current_version")]
    pub version: u32,
}

fn current_version() -> u32 {
    GUIDE_VERSION
}

impl Step {
    pub fn new(step_number: u32, action: StepAction, instruction: impl Into<String>, target: Target) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: None,
            step_number,
            action,
            instruction: instruction.into(),
            value: None,
            target,
            screenshot: None,
            created_at: now,
            updated_at: now,
            version: GUIDE_VERSION,
        }
    }

    /// Swaps the whole target, as the repair flow does. Never merges.
    pub fn replace_target(&mut self, target: Target) {
        self.target = target;
        self.updated_at = Utc::now().timestamp_millis();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub shortcut: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default = "current_version")]
    pub version: u32,
}

impl Guide {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now().timestamp_millis();
        Self {
            id: None,
            shortcut: default_shortcut(&name),
            name,
            description: String::new(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            version: GUIDE_VERSION,
        }
    }

    pub fn push_step(&mut self, mut step: Step) {
        step.step_number = self.steps.len() as u32 + 1;
        self.steps.push(step);
        self.updated_at = Utc::now().timestamp_millis();
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if !self.shortcut.starts_with('/') || self.shortcut.len() < 2 {
            return Err(SchemaError::InvalidShortcut(self.shortcut.clone()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.target.fingerprint.tag.is_empty() {
                return Err(SchemaError::MissingTag { index });
            }
        }
        Ok(())
    }
}

fn default_shortcut(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        "/guide".to_string()
    } else {
        format!("/{slug}")
    }
}

/// Flat step record written by the first recorder version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStep {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "step_number")]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub action: Option<StepAction>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub text_snapshot: Option<String>,
    #[serde(default)]
    pub text_tag_name: Option<String>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub frame_id: Option<serde_json::Value>,
    #[serde(default)]
    pub frame_href: Option<String>,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default, rename = "screenshot_path")]
    pub screenshot_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyGuide {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub shortcut: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<LegacyStep>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

pub fn migrate_step(raw: LegacyStep, now: i64) -> Step {
    let mut target = Target::default();

    if let Some(selector) = raw.selector.filter(|s| !s.is_empty()) {
        target.preferred_locators.push(Locator::css(selector, 0.6));
    }
    if let Some(snapshot) = raw.text_snapshot.filter(|s| !s.is_empty()) {
        target.fingerprint.text = Some(normalize_text(&snapshot));
        target
            .preferred_locators
            .push(Locator::text(snapshot, None, 0.35));
    }
    if let Some(tag) = raw.tag_name.or(raw.text_tag_name) {
        target.fingerprint.tag = tag.to_ascii_lowercase();
    }
    let frame_id = raw.frame_id.and_then(|value| match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    if frame_id.is_some() || raw.frame_href.is_some() {
        target.context.frame = FrameInfo {
            id: frame_id,
            href: raw.frame_href,
        };
    }
    let template = raw.screenshot_path.or(raw.screenshot.clone());
    target.vision.template_id = template;

    Step {
        id: raw.id,
        step_number: raw.step_number.unwrap_or(0),
        action: raw.action.unwrap_or_default(),
        instruction: raw.instruction.or(raw.text).unwrap_or_default(),
        value: None,
        target,
        screenshot: raw.screenshot,
        created_at: raw.created_at.unwrap_or(now),
        updated_at: now,
        version: GUIDE_VERSION,
    }
}

pub fn migrate_guide(raw: LegacyGuide, now: i64) -> Guide {
    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Untitled Guide".to_string());
    let shortcut = raw
        .shortcut
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_shortcut(&name));
    Guide {
        id: raw.id,
        shortcut,
        name,
        description: raw.description.unwrap_or_default(),
        steps: raw
            .steps
            .into_iter()
            .map(|step| migrate_step(step, now))
            .collect(),
        created_at: raw.created_at.unwrap_or(now),
        updated_at: now,
        version: GUIDE_VERSION,
    }
}
