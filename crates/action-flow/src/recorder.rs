//! Turns user interactions into guide steps.

use std::sync::Arc;
use std::time::Duration;

use action_locator::{capture_target, CaptureOptions};
use async_trait::async_trait;
use nexaura_core_types::text::squash_whitespace;
use nexaura_core_types::{truncate_chars, FrameInfo, Guide, Step, StepAction, Target};
use perceiver_structural::{is_text_input, DomTree, NodeId};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::FlowError;

const HINT_CHARS: usize = 60;

/// Event that triggered the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedEvent {
    Click,
    Submit,
}

/// Everything known about a step before it gets its instruction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDraft {
    pub action: StepAction,
    pub value: Option<String>,
    pub default_instruction: String,
    pub target: Target,
}

/// Asks someone (a prompt, a model) to describe a recorded step.
#[async_trait]
pub trait StepNamer: Send + Sync {
    /// `Ok(None)` keeps the generated instruction.
    async fn name_step(&self, draft: &StepDraft) -> Result<Option<String>, FlowError>;
}

pub struct GuideRecorder {
    guide: Guide,
    capture: CaptureOptions,
    namer: Option<Arc<dyn StepNamer>>,
    naming_timeout: Duration,
}

impl GuideRecorder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            guide: Guide::new(name),
            capture: CaptureOptions::default(),
            namer: None,
            naming_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_capture(mut self, capture: CaptureOptions) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_namer(mut self, namer: Arc<dyn StepNamer>, naming_timeout: Duration) -> Self {
        self.namer = Some(namer);
        self.naming_timeout = naming_timeout;
        self
    }

    pub fn guide(&self) -> &Guide {
        &self.guide
    }

    /// Captures `node` and appends the resulting step.
    pub async fn record(
        &mut self,
        tree: &dyn DomTree,
        node: NodeId,
        event: RecordedEvent,
        frame: FrameInfo,
    ) -> Result<&Step, FlowError> {
        let target = capture_target(tree, node, frame, &self.capture)
            .ok_or_else(|| FlowError::Capture(format!("node {} is not an element", node.0)))?;

        let (action, value) = match event {
            RecordedEvent::Submit => (StepAction::Submit, None),
            RecordedEvent::Click if is_text_input(tree, node) => {
                let value = tree.value(node).unwrap_or_else(|| tree.inner_text(node));
                (StepAction::Type, Some(value))
            }
            RecordedEvent::Click => (StepAction::Click, None),
        };

        let draft = StepDraft {
            action,
            value,
            default_instruction: default_instruction(tree, node),
            target,
        };
        let instruction = self.name(&draft).await;

        let mut step = Step::new(0, draft.action, instruction, draft.target);
        step.value = draft.value;
        self.guide.push_step(step);
        debug!(
            target: "action-flow::recorder",
            steps = self.guide.steps.len(),
            action = action.name(),
            "step recorded"
        );
        self.guide
            .steps
            .last()
            .ok_or_else(|| FlowError::Internal("recorded step vanished".to_string()))
    }

    /// Validated guide.
    pub fn finish(self) -> Result<Guide, FlowError> {
        self.guide.validate()?;
        Ok(self.guide)
    }

    async fn name(&self, draft: &StepDraft) -> String {
        let Some(namer) = &self.namer else {
            return draft.default_instruction.clone();
        };
        match timeout(self.naming_timeout, namer.name_step(draft)).await {
            Ok(Ok(Some(name))) if !name.trim().is_empty() => name.trim().to_string(),
            Ok(Ok(_)) => draft.default_instruction.clone(),
            Ok(Err(err)) => {
                warn!(target: "action-flow::recorder", error = %err, "step naming failed");
                draft.default_instruction.clone()
            }
            Err(_) => {
                warn!(target: "action-flow::recorder", "step naming timed out");
                draft.default_instruction.clone()
            }
        }
    }
}

fn default_instruction(tree: &dyn DomTree, node: NodeId) -> String {
    let mut hint = squash_whitespace(&tree.inner_text(node));
    if hint.is_empty() {
        hint = squash_whitespace(&tree.text_content(node));
    }
    if hint.is_empty() {
        "Step recorded".to_string()
    } else {
        format!("Interact: {}", truncate_chars(&hint, HINT_CHARS))
    }
}
