//! Repair hand-off with a per-step budget.
//!
//! When automated resolution fails, a human (or any other collaborator
//! behind [`RepairBroker`]) may point at the right element. The replacement
//! target is captured fresh and replaces the step's target wholesale.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nexaura_core_types::{DebugTrace, FrameInfo, Target};
use parking_lot::Mutex;
use perceiver_structural::{DomTree, NodeId};
use serde::Serialize;
use tracing::{info, warn};

use crate::capture::{capture_target, CaptureOptions};
use crate::errors::{LocatorError, ResolveFailure};

/// What the repair side gets to see about a failed step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    pub step_index: usize,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub debug: DebugTrace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResolveFailure>,
}

impl RepairRequest {
    pub fn new(step_index: usize, instruction: impl Into<String>) -> Self {
        Self {
            step_index,
            instruction: instruction.into(),
            screenshot: None,
            debug: DebugTrace::new(),
            failure: None,
        }
    }

    pub fn with_screenshot(mut self, screenshot: Option<String>) -> Self {
        self.screenshot = screenshot;
        self
    }

    pub fn with_debug(mut self, debug: DebugTrace) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_failure(mut self, failure: Option<ResolveFailure>) -> Self {
        self.failure = failure;
        self
    }
}

/// Answer from the repair side.
#[derive(Clone)]
pub enum RepairDecision {
    /// The user picked `node` in `document`
    Replace {
        document: Arc<dyn DomTree>,
        node: NodeId,
        frame: FrameInfo,
    },
    /// Try the recorded target again unchanged
    Retry,
    /// Give up on this step
    Abandon,
}

impl std::fmt::Debug for RepairDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairDecision::Replace { node, frame, .. } => f
                .debug_struct("Replace")
                .field("node", node)
                .field("frame", frame)
                .finish(),
            RepairDecision::Retry => f.write_str("Retry"),
            RepairDecision::Abandon => f.write_str("Abandon"),
        }
    }
}

/// Collaborator that asks someone to point at the right element
#[async_trait]
pub trait RepairBroker: Send + Sync {
    async fn request_repair(&self, request: RepairRequest) -> Result<RepairDecision, LocatorError>;
}

/// Result of one repair round
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// Fresh target captured from the user's pick
    Replaced { target: Target },

    /// Retry the step as recorded
    Retry,

    /// Repair side gave up
    Abandoned,

    /// The step already used its repair budget
    Exhausted,
}

impl RepairOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, RepairOutcome::Replaced { .. })
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            RepairOutcome::Replaced { target } => Some(target),
            _ => None,
        }
    }
}

/// Tracks automatic repair hand-offs per step and re-captures targets.
pub struct RepairSession {
    capture: CaptureOptions,
    max_repairs: u32,
    used: Mutex<HashMap<usize, u32>>,
}

impl Default for RepairSession {
    fn default() -> Self {
        Self::new(CaptureOptions::default(), 1)
    }
}

impl RepairSession {
    pub fn new(capture: CaptureOptions, max_repairs: u32) -> Self {
        Self {
            capture,
            max_repairs,
            used: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_available(&self, step_index: usize) -> bool {
        self.used.lock().get(&step_index).copied().unwrap_or(0) < self.max_repairs
    }

    /// Forget consumed budgets, e.g. when a guide restarts.
    pub fn reset(&self) {
        self.used.lock().clear();
    }

    /// Consults `broker` once, consuming one unit of the step's budget.
    pub async fn request(
        &self,
        broker: &dyn RepairBroker,
        request: RepairRequest,
    ) -> Result<RepairOutcome, LocatorError> {
        let step_index = request.step_index;
        {
            let mut used = self.used.lock();
            let count = used.entry(step_index).or_insert(0);
            if *count >= self.max_repairs {
                warn!(target: "action-locator::repair", step_index, "repair budget exhausted");
                return Ok(RepairOutcome::Exhausted);
            }
            *count += 1;
        }

        info!(target: "action-locator::repair", step_index, "requesting repair");
        match broker.request_repair(request).await? {
            RepairDecision::Replace {
                document,
                node,
                frame,
            } => {
                let target = self.recapture(document.as_ref(), node, frame)?;
                info!(
                    target: "action-locator::repair",
                    step_index,
                    locators = target.preferred_locators.len(),
                    "target replaced"
                );
                Ok(RepairOutcome::Replaced { target })
            }
            RepairDecision::Retry => Ok(RepairOutcome::Retry),
            RepairDecision::Abandon => Ok(RepairOutcome::Abandoned),
        }
    }

    /// Captures a replacement target for the picked node.
    pub fn recapture(
        &self,
        document: &dyn DomTree,
        node: NodeId,
        frame: FrameInfo,
    ) -> Result<Target, LocatorError> {
        capture_target(document, node, frame, &self.capture).ok_or_else(|| {
            LocatorError::CaptureFailed(format!("node {} is not an element", node.0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perceiver_structural::{MemoryDom, NodeSpec};

    struct PickButton {
        document: Arc<dyn DomTree>,
    }

    #[async_trait]
    impl RepairBroker for PickButton {
        async fn request_repair(&self, _request: RepairRequest) -> Result<RepairDecision, LocatorError> {
            let node = self.document.query_selector_all("button")?[0];
            Ok(RepairDecision::Replace {
                document: Arc::clone(&self.document),
                node,
                frame: FrameInfo::default(),
            })
        }
    }

    fn document() -> Arc<dyn DomTree> {
        Arc::new(
            MemoryDom::from_root(
                "https://app.example/",
                NodeSpec::new("html").child(
                    NodeSpec::new("body")
                        .child(NodeSpec::new("button").id("pay").text("Pay now").rect(0.0, 0.0, 50.0, 20.0)),
                ),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn replacement_is_captured_once_per_step() {
        let broker = PickButton { document: document() };
        let session = RepairSession::default();

        let outcome = session
            .request(&broker, RepairRequest::new(2, "Click Pay now"))
            .await
            .unwrap();
        let target = outcome.target().unwrap();
        assert_eq!(target.fingerprint.tag, "button");
        assert_eq!(target.fingerprint.text.as_deref(), Some("pay now"));
        assert!(!session.is_available(2));
        assert!(session.is_available(3));

        let again = session
            .request(&broker, RepairRequest::new(2, "Click Pay now"))
            .await
            .unwrap();
        assert_eq!(again, RepairOutcome::Exhausted);

        session.reset();
        assert!(session.is_available(2));
    }

    #[test]
    fn recapture_rejects_non_elements() {
        let session = RepairSession::default();
        let err = session
            .recapture(document().as_ref(), NodeId(999), FrameInfo::default())
            .unwrap_err();
        assert!(matches!(err, LocatorError::CaptureFailed(_)));
    }
}
