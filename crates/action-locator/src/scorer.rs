//! Fingerprint scoring of live candidates.
//!
//! A score is a plain sum of independent signals. Nothing here touches
//! wall-clock time or randomness, so identical inputs always score the same.

use nexaura_core_types::{normalize_text, BoundingBox, StepAction, Target};
use perceiver_structural::{clickable, is_text_input, is_visible, DomTree, JudgePolicy, NodeId};
use serde::{Deserialize, Serialize};

/// Weights for every scoring signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub tag_match: f64,
    /// Subtracted when the recorded tag is known and differs
    pub tag_mismatch: f64,
    pub role_match: f64,
    pub aria_label_match: f64,
    /// Per recorded attribute with an equal live value
    pub attr_match: f64,
    pub text_exact: f64,
    pub text_partial: f64,
    /// Per shared class token
    pub class_token: f64,
    /// Multiplies the ancestor similarity in `[0, 1]`
    pub ancestor: f64,
    pub iou_threshold: f64,
    pub iou: f64,
    pub drift_threshold: f64,
    pub drift: f64,
    /// Geometry multiplier for fingerprints without text (icon buttons)
    pub textless_geometry: f64,
    pub clickable: f64,
    /// Subtracted for text inputs when the recorded element was not one
    pub text_input_penalty: f64,
    pub visible: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            tag_match: 2.0,
            tag_mismatch: 1.5,
            role_match: 1.5,
            aria_label_match: 1.5,
            attr_match: 2.0,
            text_exact: 3.0,
            text_partial: 1.5,
            class_token: 0.4,
            ancestor: 3.0,
            iou_threshold: 0.15,
            iou: 2.0,
            drift_threshold: 0.30,
            drift: 1.5,
            textless_geometry: 3.0,
            clickable: 0.8,
            text_input_penalty: 1.0,
            visible: 1.0,
        }
    }
}

/// One named contribution to a score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub name: &'static str,
    pub value: f64,
}

/// Per-signal view of a score, used for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub signals: Vec<Signal>,
    pub total: f64,
}

impl ScoreBreakdown {
    fn add(&mut self, name: &'static str, value: f64) {
        if value != 0.0 {
            self.signals.push(Signal { name, value });
            self.total += value;
        }
    }

    pub fn get(&self, name: &str) -> f64 {
        self.signals
            .iter()
            .filter(|signal| signal.name == name)
            .map(|signal| signal.value)
            .sum()
    }
}

/// Scores live nodes against a recorded [`Target`].
#[derive(Debug, Clone, Default)]
pub struct CandidateScorer {
    weights: ScoringWeights,
    policy: JudgePolicy,
    action: Option<StepAction>,
}

impl CandidateScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights,
            policy: JudgePolicy::default(),
            action: None,
        }
    }

    /// Click steps additionally reward clickable-looking elements.
    pub fn with_action(mut self, action: Option<StepAction>) -> Self {
        self.action = action;
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score<T: DomTree + ?Sized>(&self, tree: &T, node: NodeId, target: &Target) -> f64 {
        self.breakdown(tree, node, target).total
    }

    pub fn breakdown<T: DomTree + ?Sized>(
        &self,
        tree: &T,
        node: NodeId,
        target: &Target,
    ) -> ScoreBreakdown {
        let w = &self.weights;
        let fp = &target.fingerprint;
        let mut out = ScoreBreakdown::default();
        if !tree.is_element(node) {
            return out;
        }

        let tag = tree.tag_name(node).unwrap_or_default().to_ascii_lowercase();
        if fp.has_known_tag() {
            if tag == fp.tag {
                out.add("tag", w.tag_match);
            } else {
                out.add("tag", -w.tag_mismatch);
            }
        }

        if let Some(role) = fp.role.as_deref().filter(|r| !r.is_empty()) {
            if tree.attribute(node, "role").as_deref() == Some(role) {
                out.add("role", w.role_match);
            }
        }
        if let Some(label) = fp.aria_label.as_deref().filter(|l| !l.is_empty()) {
            if tree.attribute(node, "aria-label").as_deref() == Some(label) {
                out.add("aria-label", w.aria_label_match);
            }
        }

        let attr_hits = fp
            .attrs
            .iter()
            .filter(|(name, value)| {
                !value.is_empty() && tree.attribute(node, name).as_deref() == Some(value.as_str())
            })
            .count();
        out.add("attrs", attr_hits as f64 * w.attr_match);

        if let Some(recorded) = fp.text().map(normalize_text) {
            let live = candidate_text(tree, node);
            if !live.is_empty() {
                if live == recorded {
                    out.add("text", w.text_exact);
                } else if live.contains(&recorded) || recorded.contains(&live) {
                    out.add("text", w.text_partial);
                }
            }
        }

        if !fp.class_tokens.is_empty() {
            let hits = tree
                .attribute(node, "class")
                .map(|class| {
                    class
                        .split_whitespace()
                        .filter(|token| fp.class_tokens.contains(*token))
                        .count()
                })
                .unwrap_or(0);
            out.add("classes", hits as f64 * w.class_token);
        }

        out.add(
            "ancestors",
            ancestor_similarity(tree, node, target) * w.ancestor,
        );

        if let Some(recorded) = target.vision.bbox.filter(BoundingBox::is_finite) {
            if let Some(live) = tree.bounding_box(node) {
                let live = live.scaled(device_pixel_ratio(tree));
                let multiplier = if fp.text().is_none() {
                    w.textless_geometry
                } else {
                    1.0
                };
                let iou = live.iou(&recorded);
                if iou > w.iou_threshold {
                    out.add("iou", iou * w.iou * multiplier);
                }
                let drift = live.center_drift(&recorded);
                if drift < w.drift_threshold {
                    out.add("drift", (1.0 - drift) * w.drift * multiplier);
                }
            }
        }

        if self.action == Some(StepAction::Click) {
            if clickable(tree, node, &self.policy).ok {
                out.add("clickable", w.clickable);
            }
            if is_text_input(tree, node) && !fp.is_text_input() {
                out.add("text-input", -w.text_input_penalty);
            }
        }

        if is_visible(tree, node) {
            out.add("visible", w.visible);
        }
        out
    }
}

/// Text a user would associate with the node: rendered text, then form
/// value, then the usual tooltip-ish attributes.
pub fn candidate_text<T: DomTree + ?Sized>(tree: &T, node: NodeId) -> String {
    let inner = normalize_text(&tree.inner_text(node));
    if !inner.is_empty() {
        return inner;
    }
    if let Some(value) = tree.value(node).map(|v| normalize_text(&v)).filter(|v| !v.is_empty()) {
        return value;
    }
    ["aria-label", "data-tooltip", "title"]
        .iter()
        .filter_map(|attr| tree.attribute(node, attr))
        .map(|raw| normalize_text(&raw))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Position-by-position agreement between the recorded trail and the live
/// ancestors, both read from the nearest ancestor outwards. In `[0, 1]`.
pub fn ancestor_similarity<T: DomTree + ?Sized>(tree: &T, node: NodeId, target: &Target) -> f64 {
    let recorded = &target.context.ancestor_trail;
    if recorded.is_empty() {
        return 0.0;
    }
    let live = tree.ancestors(node);
    let matches: f64 = recorded
        .iter()
        .rev()
        .zip(live.iter())
        .map(|(segment, ancestor)| {
            let mut points = 0.0;
            if tree.tag_name(*ancestor).map(|t| t.to_ascii_lowercase()).as_deref()
                == Some(segment.tag.as_str())
            {
                points += 0.6;
            }
            let delta = segment.index.abs_diff(tree.same_tag_index(*ancestor)) as f64;
            points + (0.4 - 0.2 * delta).max(0.0)
        })
        .sum();
    (matches / recorded.len() as f64).min(1.0)
}

fn device_pixel_ratio<T: DomTree + ?Sized>(tree: &T) -> f64 {
    let dpr = tree.device_pixel_ratio();
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexaura_core_types::{AncestorSegment, Fingerprint};
    use perceiver_structural::{MemoryDom, NodeSpec};

    fn page() -> MemoryDom {
        MemoryDom::from_root(
            "https://app.example/",
            NodeSpec::new("html").rect(0.0, 0.0, 400.0, 300.0).child(
                NodeSpec::new("body").rect(0.0, 0.0, 400.0, 300.0).children([
                    NodeSpec::new("button")
                        .id("send")
                        .class("btn primary")
                        .attr("data-testid", "send")
                        .text("Send")
                        .rect(10.0, 10.0, 80.0, 30.0),
                    NodeSpec::new("input")
                        .attr("type", "text")
                        .value("send")
                        .rect(10.0, 60.0, 200.0, 30.0),
                    NodeSpec::new("button")
                        .attr("aria-label", "Close")
                        .rect(300.0, 10.0, 20.0, 20.0),
                    NodeSpec::new("span").text("Send").display("none"),
                ]),
            ),
        )
        .unwrap()
    }

    fn send_target() -> Target {
        let mut fp = Fingerprint::new("button");
        fp.text = Some("send".into());
        fp.attrs.insert("data-testid".into(), "send".into());
        fp.class_tokens.insert("primary".into());
        let mut target = Target::from_fingerprint(fp);
        target.context.ancestor_trail = vec![
            AncestorSegment { tag: "html".into(), index: 0 },
            AncestorSegment { tag: "body".into(), index: 0 },
        ];
        target
    }

    #[test]
    fn exact_element_collects_every_signal() {
        let dom = page();
        let button = dom.by_id("send").unwrap();
        let scorer = CandidateScorer::default();
        let breakdown = scorer.breakdown(&dom, button, &send_target());
        assert_eq!(breakdown.get("tag"), 2.0);
        assert_eq!(breakdown.get("attrs"), 2.0);
        assert_eq!(breakdown.get("text"), 3.0);
        assert!((breakdown.get("classes") - 0.4).abs() < 1e-9);
        assert!((breakdown.get("ancestors") - 3.0).abs() < 1e-9);
        assert_eq!(breakdown.get("visible"), 1.0);
        assert!((breakdown.total - 11.4).abs() < 1e-9);
    }

    #[test]
    fn known_tag_mismatch_is_penalised_unknown_is_not() {
        let dom = page();
        let input = dom.query_selector_all("input").unwrap()[0];
        let scorer = CandidateScorer::default();
        assert_eq!(scorer.breakdown(&dom, input, &send_target()).get("tag"), -1.5);

        let mut legacy = send_target();
        legacy.fingerprint.tag = "*".into();
        assert_eq!(scorer.breakdown(&dom, input, &legacy).get("tag"), 0.0);
    }

    #[test]
    fn form_value_counts_as_text() {
        let dom = page();
        let input = dom.query_selector_all("input").unwrap()[0];
        assert_eq!(candidate_text(&dom, input), "send");
        let close = dom.query_selector_all("[aria-label]").unwrap()[0];
        assert_eq!(candidate_text(&dom, close), "close");
    }

    #[test]
    fn empty_live_text_never_matches() {
        let dom = page();
        let close = dom.query_selector_all("[aria-label]").unwrap()[0];
        let mut target = send_target();
        target.fingerprint.text = Some("close dialog".into());
        assert_eq!(
            CandidateScorer::default().breakdown(&dom, close, &target).get("text"),
            1.5
        );
        let span = dom.query_selector_all("span").unwrap()[0];
        assert_eq!(
            CandidateScorer::default().breakdown(&dom, span, &send_target()).get("text"),
            0.0
        );
    }

    #[test]
    fn click_steps_prefer_buttons_over_text_fields() {
        let dom = page();
        let button = dom.by_id("send").unwrap();
        let input = dom.query_selector_all("input").unwrap()[0];
        let scorer = CandidateScorer::default().with_action(Some(StepAction::Click));
        let target = send_target();
        assert_eq!(scorer.breakdown(&dom, button, &target).get("clickable"), 0.8);
        assert_eq!(scorer.breakdown(&dom, input, &target).get("text-input"), -1.0);
        assert!(scorer.score(&dom, button, &target) > scorer.score(&dom, input, &target));
    }

    #[test]
    fn disabled_buttons_earn_no_click_bonus() {
        let dom = MemoryDom::from_root(
            "https://app.example/",
            NodeSpec::new("html").rect(0.0, 0.0, 400.0, 300.0).child(
                NodeSpec::new("body").rect(0.0, 0.0, 400.0, 300.0).children([
                    NodeSpec::new("button").id("on").text("Send").rect(10.0, 10.0, 80.0, 30.0),
                    NodeSpec::new("button")
                        .id("off")
                        .attr("disabled", "")
                        .text("Send")
                        .rect(10.0, 50.0, 80.0, 30.0),
                ]),
            ),
        )
        .unwrap();
        let scorer = CandidateScorer::default().with_action(Some(StepAction::Click));
        let target = send_target();
        let on = dom.by_id("on").unwrap();
        let off = dom.by_id("off").unwrap();
        assert_eq!(scorer.breakdown(&dom, off, &target).get("clickable"), 0.0);
        assert!(scorer.score(&dom, on, &target) > scorer.score(&dom, off, &target));
    }

    #[test]
    fn textless_targets_lean_on_geometry() {
        let dom = page();
        let close = dom.query_selector_all("[aria-label]").unwrap()[0];
        let mut target = Target::from_fingerprint(Fingerprint::new("button"));
        target.vision.bbox = Some(BoundingBox::new(300.0, 10.0, 20.0, 20.0));
        let breakdown = CandidateScorer::default().breakdown(&dom, close, &target);
        assert!((breakdown.get("iou") - 6.0).abs() < 1e-9);
        assert!((breakdown.get("drift") - 4.5).abs() < 1e-9);
    }

    #[test]
    fn ancestor_trail_is_compared_from_the_nearest_end() {
        let dom = page();
        let button = dom.by_id("send").unwrap();
        let mut target = Target::default();
        target.context.ancestor_trail = vec![
            AncestorSegment { tag: "div".into(), index: 3 },
            AncestorSegment { tag: "body".into(), index: 0 },
        ];
        // body matches fully; html vs recorded div: index off by 3, tag wrong
        assert!((ancestor_similarity(&dom, button, &target) - 0.5).abs() < 1e-9);
    }
}
