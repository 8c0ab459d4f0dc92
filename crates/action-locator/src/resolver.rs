//! Resolution orchestrator: stability gate, frame scan, candidate pooling,
//! fallback tiers and the retry loop.

use std::cmp::Ordering;
use std::collections::HashMap;

use nexaura_core_types::text::squash_whitespace;
use nexaura_core_types::{normalize_text, DebugTrace, Locator, LocatorKind, Target};
use perceiver_structural::{
    is_visible, scan_frames, wait_for_dom_stable, DomTree, FrameHandle, NodeId,
    StabilityOptions, StabilityVerdict,
};
use serde_json::json;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{container_heading, visible_text};
use crate::errors::ResolveFailure;
use crate::scorer::CandidateScorer;
use crate::strategies::{fingerprint_text, relation_anchor, structural_trail, LocatorStrategies};
use crate::types::*;

const TRAIL_CONFIDENCE: f64 = 0.3;
const FINGERPRINT_TEXT_CONFIDENCE: f64 = 0.2;
const ANCHOR_CONFIDENCE: f64 = 0.9;
/// Confidence floor for locators keyed on a high-value attribute
const HIGH_VALUE_CONFIDENCE: f64 = 0.95;

/// Resolves recorded targets against live pages.
#[derive(Default)]
pub struct LocatorEngine {
    strategies: LocatorStrategies,
}

impl LocatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `target` on `page`.
    ///
    /// Never fails outright: every outcome, including cancellation, is a
    /// [`Resolution`]. Candidates are only accepted when visible and scoring
    /// at least the acceptance floor. Total time is bounded by
    /// `options.timeout` plus one synchronous attempt.
    pub async fn resolve(
        &self,
        page: &PageSession,
        target: &Target,
        options: &ResolveOptions,
        cancel: &CancellationToken,
    ) -> Resolution {
        let deadline = Instant::now() + options.timeout;
        let mut debug = DebugTrace::new();
        let mut attempts = 0u32;
        let mut failure = ResolveFailure::NoCandidates;

        info!(
            target: "action-locator::resolver",
            tag = %target.fingerprint.tag,
            locators = target.preferred_locators.len(),
            "resolving target"
        );

        loop {
            if cancel.is_cancelled() {
                return Resolution::skipped(debug, attempts);
            }
            let now = Instant::now();
            if now >= deadline {
                failure = ResolveFailure::Timeout;
                break;
            }

            let gate = StabilityOptions {
                timeout: (deadline - now).min(options.stability_timeout),
                quiet_period: options.quiet_period,
            };
            let verdict = timeout_at(
                deadline,
                wait_for_dom_stable(page.mutations.as_ref(), gate, cancel),
            )
            .await
            .unwrap_or(StabilityVerdict::Unstable {
                reason: perceiver_structural::UnstableReason::Timeout,
            });
            match verdict {
                StabilityVerdict::Cancelled => return Resolution::skipped(debug, attempts),
                StabilityVerdict::Unstable { .. } => {
                    debug.warn("dom still mutating; resolving anyway");
                }
                StabilityVerdict::Stable => {}
            }

            attempts += 1;
            match self.attempt(page, target, options, &mut debug) {
                Ok(element) => {
                    info!(
                        target: "action-locator::resolver",
                        frame = %element.frame,
                        score = element.score,
                        matched_by = %element.matched_by,
                        attempts,
                        "target resolved"
                    );
                    return Resolution::success(element, debug, attempts);
                }
                Err(missed) => failure = missed,
            }

            if attempts > options.retries {
                break;
            }
            let wake = (Instant::now() + options.base_delay * attempts).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Resolution::skipped(debug, attempts),
                _ = sleep_until(wake) => {}
            }
        }

        warn!(
            target: "action-locator::resolver",
            failure = failure.name(),
            attempts,
            "target not resolved"
        );
        let message = match failure {
            ResolveFailure::Timeout => "Timed out resolving target",
            ResolveFailure::LowConfidence => "No candidate scored high enough",
            _ => "Unable to resolve target",
        };
        Resolution::hard_fail(failure, message, debug, attempts)
    }

    /// One pass over every frame. The first frame yielding an accepted
    /// candidate wins.
    fn attempt(
        &self,
        page: &PageSession,
        target: &Target,
        options: &ResolveOptions,
        debug: &mut DebugTrace,
    ) -> Result<ResolvedElement, ResolveFailure> {
        let mut failure = ResolveFailure::NoCandidates;
        for frame in scan_frames(page.document.clone()) {
            match self.resolve_in_frame(&frame, target, options, debug) {
                Ok(element) => return Ok(element),
                Err(ResolveFailure::LowConfidence) => failure = ResolveFailure::LowConfidence,
                Err(_) => {}
            }
        }
        Err(failure)
    }

    /// Scores every candidate of one frame and picks the best.
    pub fn resolve_in_frame(
        &self,
        frame: &FrameHandle,
        target: &Target,
        options: &ResolveOptions,
        debug: &mut DebugTrace,
    ) -> Result<ResolvedElement, ResolveFailure> {
        let tree = frame.document.as_ref();
        let scorer = CandidateScorer::new(options.weights.clone()).with_action(options.action);
        let mut pool = CandidatePool::new(tree, target, &scorer, options);

        for locator in ordered_locators(target, options) {
            match self.strategies.find(tree, locator) {
                Ok(nodes) => pool.push(
                    nodes,
                    locator.kind.into(),
                    effective_confidence(locator, options),
                    Some(locator),
                ),
                Err(err) => {
                    debug!(target: "action-locator::resolver", error = %err, "locator skipped");
                    debug.warn(format!("locator {} skipped: {}", locator.key(), err));
                }
            }
        }

        if pool.is_empty() && !target.context.ancestor_trail.is_empty() {
            pool.push(
                structural_trail(tree, target),
                MatchSource::AncestorTrail,
                TRAIL_CONFIDENCE,
                None,
            );
        }
        if pool.is_empty() && target.fingerprint.text().is_some() {
            pool.push(
                fingerprint_text(tree, target),
                MatchSource::FingerprintText,
                FINGERPRINT_TEXT_CONFIDENCE,
                None,
            );
        }
        if pool.is_empty() && target.anchor.is_some() {
            if let Some(node) = relation_anchor(tree, target) {
                pool.push(vec![node], MatchSource::Anchor, ANCHOR_CONFIDENCE, None);
            }
        }

        let candidates = pool.into_ranked();
        let Some(best) = candidates.first() else {
            debug.info_with("no candidates", json!({ "frame": frame.frame_id.0 }));
            return Err(ResolveFailure::NoCandidates);
        };

        let visible = is_visible(tree, best.node);
        if !visible || best.score < options.acceptance_floor {
            debug.info_with(
                "best candidate rejected",
                json!({
                    "frame": frame.frame_id.0,
                    "score": best.score,
                    "visible": visible,
                    "candidates": candidates.len(),
                }),
            );
            return Err(ResolveFailure::LowConfidence);
        }

        debug.info_with(
            "candidate accepted",
            json!({
                "frame": frame.frame_id.0,
                "score": best.score,
                "matchedBy": best.matched_by.name(),
                "candidates": candidates.len(),
            }),
        );
        Ok(ResolvedElement {
            node: best.node,
            frame: frame.frame_id.clone(),
            score: best.score,
            matched_by: best.matched_by,
            locator_key: best.locator_key.clone(),
            tag: tree.tag_name(best.node),
            handle: Some(frame.clone()),
        })
    }
}

/// Recorded locators, most specific first. Ties keep recorded order.
pub fn ordered_locators<'a>(target: &'a Target, options: &ResolveOptions) -> Vec<&'a Locator> {
    let mut locators: Vec<&Locator> = target.preferred_locators.iter().collect();
    locators.sort_by(|a, b| {
        specificity(b, options)
            .partial_cmp(&specificity(a, options))
            .unwrap_or(Ordering::Equal)
    });
    locators
}

/// Confidence plus bonuses for high-value attributes, ids and text.
pub fn specificity(locator: &Locator, options: &ResolveOptions) -> f64 {
    let mut score = locator.confidence;
    if references_high_value_attr(locator, options) {
        score += 2.0;
    }
    match locator.kind {
        LocatorKind::Id => score += 3.0,
        LocatorKind::Text => score += 1.5,
        _ => {}
    }
    score
}

fn effective_confidence(locator: &Locator, options: &ResolveOptions) -> f64 {
    if references_high_value_attr(locator, options) {
        locator.confidence.max(HIGH_VALUE_CONFIDENCE)
    } else {
        locator.confidence
    }
}

fn references_high_value_attr(locator: &Locator, options: &ResolveOptions) -> bool {
    let value = locator.value.to_ascii_lowercase();
    options
        .high_value_attrs
        .iter()
        .any(|attr| value.contains(&attr.to_ascii_lowercase()))
}

/// Candidates of one frame, deduplicated by node in first-seen order.
struct CandidatePool<'a> {
    tree: &'a dyn DomTree,
    target: &'a Target,
    scorer: &'a CandidateScorer,
    options: &'a ResolveOptions,
    container: Option<String>,
    index: HashMap<NodeId, usize>,
    candidates: Vec<Candidate>,
}

impl<'a> CandidatePool<'a> {
    fn new(
        tree: &'a dyn DomTree,
        target: &'a Target,
        scorer: &'a CandidateScorer,
        options: &'a ResolveOptions,
    ) -> Self {
        Self {
            tree,
            target,
            scorer,
            options,
            container: target.container_text().map(normalize_text),
            index: HashMap::new(),
            candidates: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn push(
        &mut self,
        nodes: Vec<NodeId>,
        source: MatchSource,
        confidence: f64,
        locator: Option<&Locator>,
    ) {
        let filter = locator
            .and_then(|l| l.text_filter.as_deref())
            .map(|f| squash_whitespace(f.trim()))
            .filter(|f| !f.is_empty());

        for node in nodes {
            if !self.tree.is_element(node) {
                continue;
            }
            if let Some(filter) = &filter {
                let text = squash_whitespace(visible_text(self.tree, node).trim());
                if &text != filter {
                    continue;
                }
            }
            let slot = match self.index.get(&node) {
                Some(slot) => *slot,
                None => {
                    let candidate = self.admit(node, source);
                    self.candidates.push(candidate);
                    self.index.insert(node, self.candidates.len() - 1);
                    self.candidates.len() - 1
                }
            };
            let candidate = &mut self.candidates[slot];
            candidate.score += self.options.locator_weight * confidence;
            candidate.hits += 1;
            if candidate.locator_key.is_none() {
                candidate.locator_key = locator.map(Locator::key);
            }
        }
    }

    /// Base fingerprint score and container adjustment, applied once.
    fn admit(&self, node: NodeId, source: MatchSource) -> Candidate {
        let mut score = self.scorer.score(self.tree, node, self.target);
        if let Some(recorded) = &self.container {
            let live = container_heading(self.tree, node).map(|(_, text)| text);
            if live.is_some_and(|live| headings_match(&live, recorded)) {
                score += self.options.container_bonus;
            } else {
                score -= self.options.container_penalty;
            }
        }
        debug!(
            target: "action-locator::resolver",
            node = node.0,
            source = source.name(),
            score,
            "candidate admitted"
        );
        Candidate::new(node, score, source)
    }

    /// Highest score first; ties keep discovery order.
    fn into_ranked(mut self) -> Vec<Candidate> {
        self.candidates
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        self.candidates
    }
}

/// Live and recorded container headings are both normalized; either may
/// carry extra text such as a card count.
fn headings_match(live: &str, recorded: &str) -> bool {
    !recorded.is_empty() && (live.contains(recorded) || recorded.contains(live))
}
