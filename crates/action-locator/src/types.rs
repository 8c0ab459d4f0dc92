//! Core types for the locator engine

use std::sync::Arc;
use std::time::Duration;

use nexaura_core_types::{DebugTrace, FrameId, FrameInfo, LocatorKind, StepAction};
use perceiver_structural::{DomTree, FrameHandle, MutationFeed, NodeId, QuietFeed};
use serde::{Deserialize, Serialize};

use crate::errors::ResolveFailure;
use crate::scorer::ScoringWeights;

/// Everything a resolution needs to know about the live page.
///
/// Passed through every call instead of living in globals, so two sessions
/// can resolve against different pages concurrently.
#[derive(Clone)]
pub struct PageSession {
    /// Top-level document
    pub document: Arc<dyn DomTree>,

    /// Mutation notifications for the stability gate
    pub mutations: Arc<dyn MutationFeed>,

    /// Frame this session's script runs in
    pub current_frame: FrameInfo,
}

impl PageSession {
    /// Session over a static document: no mutations, top frame.
    pub fn new(document: Arc<dyn DomTree>) -> Self {
        let current_frame = FrameInfo::new(FrameId::top().0, document.location());
        Self {
            document,
            mutations: Arc::new(QuietFeed::new()),
            current_frame,
        }
    }

    pub fn with_mutations(mut self, mutations: Arc<dyn MutationFeed>) -> Self {
        self.mutations = mutations;
        self
    }

    pub fn with_frame(mut self, frame: FrameInfo) -> Self {
        self.current_frame = frame;
        self
    }
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("location", &self.document.location())
            .field("current_frame", &self.current_frame)
            .finish()
    }
}

/// Tuning for one resolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Overall deadline across every attempt
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// Extra attempts after the first
    pub retries: u32,

    /// Backoff unit; attempt `n` sleeps `base_delay * n`
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,

    /// Upper bound for the DOM quiescence wait per attempt
    #[serde(with = "duration_ms")]
    pub stability_timeout: Duration,

    /// Mutation-free window that counts as quiescent
    #[serde(with = "duration_ms")]
    pub quiet_period: Duration,

    /// Minimum score for the top candidate
    pub acceptance_floor: f64,

    /// Added per matching locator, times its effective confidence
    pub locator_weight: f64,

    /// Added once when the candidate's container heading matches
    pub container_bonus: f64,

    /// Subtracted once when it does not
    pub container_penalty: f64,

    /// Attribute names that mark a locator as highly specific
    pub high_value_attrs: Vec<String>,

    /// Signal weights for the fingerprint scorer
    pub weights: ScoringWeights,

    /// Step action, enables the click-affordance signal
    #[serde(skip)]
    pub action: Option<StepAction>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            retries: 3,
            base_delay: Duration::from_millis(200),
            stability_timeout: Duration::from_millis(1500),
            quiet_period: Duration::from_millis(250),
            acceptance_floor: 2.0,
            locator_weight: 2.0,
            container_bonus: 50.0,
            container_penalty: 20.0,
            high_value_attrs: default_high_value_attrs(),
            weights: ScoringWeights::default(),
            action: None,
        }
    }
}

impl ResolveOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn for_action(mut self, action: StepAction) -> Self {
        self.action = Some(action);
        self
    }
}

pub fn default_high_value_attrs() -> Vec<String> {
    ["data-testid", "data-test", "data-qa", "data-cy"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchSource {
    Id,
    Css,
    Role,
    Text,
    Xpath,
    /// Structural trail fallback
    AncestorTrail,
    /// Recorded fingerprint text fallback
    FingerprintText,
    /// Relation anchor fallback
    Anchor,
    /// Screenshot template match
    Vision,
}

impl MatchSource {
    pub fn name(&self) -> &'static str {
        match self {
            MatchSource::Id => "id",
            MatchSource::Css => "css",
            MatchSource::Role => "role",
            MatchSource::Text => "text",
            MatchSource::Xpath => "xpath",
            MatchSource::AncestorTrail => "ancestor-trail",
            MatchSource::FingerprintText => "fingerprint-text",
            MatchSource::Anchor => "anchor",
            MatchSource::Vision => "vision",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            MatchSource::AncestorTrail
                | MatchSource::FingerprintText
                | MatchSource::Anchor
                | MatchSource::Vision
        )
    }
}

impl From<LocatorKind> for MatchSource {
    fn from(kind: LocatorKind) -> Self {
        match kind {
            LocatorKind::Id => MatchSource::Id,
            LocatorKind::Css => MatchSource::Css,
            LocatorKind::Role => MatchSource::Role,
            LocatorKind::Text => MatchSource::Text,
            LocatorKind::Xpath => MatchSource::Xpath,
        }
    }
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A live node proposed for the target, with its accumulated score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node: NodeId,
    pub score: f64,

    /// First source that produced the node
    pub matched_by: MatchSource,

    /// Key of the first locator that matched, if any
    pub locator_key: Option<String>,

    /// Number of locators that matched the node
    pub hits: usize,
}

impl Candidate {
    pub fn new(node: NodeId, base_score: f64, matched_by: MatchSource) -> Self {
        Self {
            node,
            score: base_score,
            matched_by,
            locator_key: None,
            hits: 0,
        }
    }
}

/// Terminal status of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveStatus {
    Success,
    HardFail,
    Skipped,
}

/// The element a resolution settled on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedElement {
    pub node: NodeId,
    pub frame: FrameId,
    pub score: f64,
    pub matched_by: MatchSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Document the node belongs to
    #[serde(skip)]
    pub handle: Option<FrameHandle>,
}

impl ResolvedElement {
    pub fn document(&self) -> Option<&Arc<dyn DomTree>> {
        self.handle.as_ref().map(|handle| &handle.document)
    }
}

/// Outcome of [`crate::LocatorEngine::resolve`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub status: ResolveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ResolvedElement>,
    #[serde(default)]
    pub debug: DebugTrace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResolveFailure>,
    #[serde(default)]
    pub attempts: u32,
}

impl Resolution {
    pub fn success(element: ResolvedElement, debug: DebugTrace, attempts: u32) -> Self {
        Self {
            status: ResolveStatus::Success,
            element: Some(element),
            debug,
            error: None,
            failure: None,
            attempts,
        }
    }

    pub fn hard_fail(
        failure: ResolveFailure,
        error: impl Into<String>,
        debug: DebugTrace,
        attempts: u32,
    ) -> Self {
        Self {
            status: ResolveStatus::HardFail,
            element: None,
            debug,
            error: Some(error.into()),
            failure: Some(failure),
            attempts,
        }
    }

    pub fn skipped(debug: DebugTrace, attempts: u32) -> Self {
        Self {
            status: ResolveStatus::Skipped,
            element: None,
            debug,
            error: None,
            failure: Some(ResolveFailure::Cancelled),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResolveStatus::Success
    }

    pub fn is_skipped(&self) -> bool {
        self.status == ResolveStatus::Skipped
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
