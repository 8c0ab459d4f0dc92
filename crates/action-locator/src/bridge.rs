use std::sync::Arc;

use nexaura_core_types::{DebugTrace, FrameId, Target};
use perceiver_structural::{scan_frames, DomTree};
use perceiver_visual::VisionFallback;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::resolver::LocatorEngine;
use crate::types::{MatchSource, PageSession, Resolution, ResolveOptions, ResolvedElement};

/// Which tier produced the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedVia {
    Locator,
    Vision,
}

/// Result of the locator → vision escalation chain.
#[derive(Debug, Clone)]
pub enum EscalationOutcome {
    Resolved {
        element: ResolvedElement,
        via: ResolvedVia,
        /// Locator attempts spent, including the ones before a vision hit
        attempts: u32,
        debug: DebugTrace,
    },
    /// Every automated tier failed; the resolution carries the detail
    NeedsRepair { resolution: Resolution },
    Skipped { debug: DebugTrace },
}

impl EscalationOutcome {
    pub fn element(&self) -> Option<&ResolvedElement> {
        match self {
            EscalationOutcome::Resolved { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn debug(&self) -> &DebugTrace {
        match self {
            EscalationOutcome::Resolved { debug, .. } | EscalationOutcome::Skipped { debug } => debug,
            EscalationOutcome::NeedsRepair { resolution } => &resolution.debug,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            EscalationOutcome::Resolved { attempts, .. } => *attempts,
            EscalationOutcome::NeedsRepair { resolution } => resolution.attempts,
            EscalationOutcome::Skipped { .. } => 0,
        }
    }
}

/// Locator engine first, then the screenshot template match.
pub struct SelfHealingResolver {
    engine: LocatorEngine,
    vision: Option<Arc<VisionFallback>>,
}

impl SelfHealingResolver {
    pub fn new(engine: LocatorEngine, vision: Option<Arc<VisionFallback>>) -> Self {
        Self { engine, vision }
    }

    /// Locator engine only, no vision tier.
    pub fn locator_only() -> Self {
        Self::new(LocatorEngine::new(), None)
    }

    pub fn engine(&self) -> &LocatorEngine {
        &self.engine
    }

    pub async fn resolve(
        &self,
        page: &PageSession,
        target: &Target,
        options: &ResolveOptions,
        cancel: &CancellationToken,
    ) -> EscalationOutcome {
        let mut resolution = self.engine.resolve(page, target, options, cancel).await;
        if resolution.is_skipped() {
            return EscalationOutcome::Skipped {
                debug: resolution.debug,
            };
        }
        if let Some(element) = resolution.element.take() {
            return EscalationOutcome::Resolved {
                element,
                via: ResolvedVia::Locator,
                attempts: resolution.attempts,
                debug: resolution.debug,
            };
        }

        let Some(vision) = &self.vision else {
            return EscalationOutcome::NeedsRepair { resolution };
        };
        if cancel.is_cancelled() {
            return EscalationOutcome::Skipped {
                debug: resolution.debug,
            };
        }

        let document: &dyn DomTree = page.document.as_ref();
        match vision.locate(target, document, &mut resolution.debug).await {
            Some(node) => {
                info!(target: "action-locator::bridge", node = node.0, "resolved by vision fallback");
                let handle = scan_frames(Arc::clone(&page.document)).into_iter().next();
                let element = ResolvedElement {
                    node,
                    frame: FrameId::top(),
                    score: 0.0,
                    matched_by: MatchSource::Vision,
                    locator_key: None,
                    tag: document.tag_name(node),
                    handle,
                };
                EscalationOutcome::Resolved {
                    element,
                    via: ResolvedVia::Vision,
                    attempts: resolution.attempts,
                    debug: resolution.debug,
                }
            }
            None => {
                warn!(target: "action-locator::bridge", "all automated tiers failed");
                EscalationOutcome::NeedsRepair { resolution }
            }
        }
    }
}
