//! DOM quiescence gate.
//!
//! Waits until no mutation has been observed for a quiet period, bounded by
//! a timeout. The verdict is advisory: callers search the page either way.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::select;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dom::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    #[serde(default)]
    pub target: Option<NodeId>,
    #[serde(default)]
    pub attribute: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: Option<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            attribute: None,
        }
    }

    pub fn attribute(target: Option<NodeId>, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            attribute: Some(name.into()),
        }
    }
}

/// Source of subtree mutation notifications for one document.
pub trait MutationFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<MutationRecord>;
}

/// Shared in-process feed; whoever drives the page publishes into it.
#[derive(Clone)]
pub struct MutationHub {
    tx: broadcast::Sender<MutationRecord>,
}

impl MutationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of live subscribers that saw the record.
    pub fn publish(&self, record: MutationRecord) -> usize {
        self.tx.send(record).unwrap_or(0)
    }
}

impl Default for MutationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MutationFeed for MutationHub {
    fn subscribe(&self) -> broadcast::Receiver<MutationRecord> {
        self.tx.subscribe()
    }
}

/// Feed for static documents such as snapshots: it never reports anything.
pub struct QuietFeed {
    tx: broadcast::Sender<MutationRecord>,
}

impl QuietFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }
}

impl Default for QuietFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationFeed for QuietFeed {
    fn subscribe(&self) -> broadcast::Receiver<MutationRecord> {
        self.tx.subscribe()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityOptions {
    #[serde(with = "millis")]
    pub timeout: Duration,
    #[serde(with = "millis")]
    pub quiet_period: Duration,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1500),
            quiet_period: Duration::from_millis(250),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnstableReason {
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum StabilityVerdict {
    Stable,
    Unstable { reason: UnstableReason },
    Cancelled,
}

impl StabilityVerdict {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityVerdict::Stable)
    }
}

pub async fn wait_for_dom_stable(
    feed: &dyn MutationFeed,
    options: StabilityOptions,
    cancel: &CancellationToken,
) -> StabilityVerdict {
    let mut rx = feed.subscribe();
    let start = Instant::now();
    let deadline = start + options.timeout;
    let mut last_mutation = start;
    let mut closed = false;
    let mut seen = 0usize;

    loop {
        let quiet_at = last_mutation + options.quiet_period;
        let wake_at = quiet_at.min(deadline);
        select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target: "perceiver-stability", "stability wait cancelled");
                return StabilityVerdict::Cancelled;
            }
            record = rx.recv(), if !closed => {
                match record {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        seen += 1;
                        last_mutation = Instant::now();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        closed = true;
                    }
                }
            }
            _ = sleep_until(wake_at) => {
                if Instant::now() >= quiet_at {
                    debug!(
                        target: "perceiver-stability",
                        mutations = seen,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "dom quiescent"
                    );
                    return StabilityVerdict::Stable;
                }
                debug!(
                    target: "perceiver-stability",
                    mutations = seen,
                    "dom still mutating at deadline"
                );
                return StabilityVerdict::Unstable {
                    reason: UnstableReason::Timeout,
                };
            }
        }
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn options(timeout_ms: u64, quiet_ms: u64) -> StabilityOptions {
        StabilityOptions {
            timeout: Duration::from_millis(timeout_ms),
            quiet_period: Duration::from_millis(quiet_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_document_is_stable_after_quiet_period() {
        let feed = QuietFeed::new();
        let started = Instant::now();
        let verdict = wait_for_dom_stable(&feed, options(1500, 250), &CancellationToken::new()).await;
        assert_eq!(verdict, StabilityVerdict::Stable);
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn constant_mutation_times_out() {
        let hub = Arc::new(MutationHub::default());
        let publisher = Arc::clone(&hub);
        let pump = tokio::spawn(async move {
            for _ in 0..40 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                publisher.publish(MutationRecord::child_list(None));
            }
        });
        let started = Instant::now();
        let verdict = wait_for_dom_stable(hub.as_ref(), options(1000, 250), &CancellationToken::new()).await;
        assert_eq!(
            verdict,
            StabilityVerdict::Unstable {
                reason: UnstableReason::Timeout
            }
        );
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_quiet_settles() {
        let hub = Arc::new(MutationHub::default());
        let publisher = Arc::clone(&hub);
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                publisher.publish(MutationRecord::attribute(None, "class"));
            }
        });
        let started = Instant::now();
        let verdict = wait_for_dom_stable(hub.as_ref(), options(1500, 250), &CancellationToken::new()).await;
        assert!(verdict.is_stable());
        assert_eq!(started.elapsed(), Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins() {
        let feed = QuietFeed::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let verdict = wait_for_dom_stable(&feed, options(1500, 250), &cancel).await;
        assert_eq!(verdict, StabilityVerdict::Cancelled);
    }
}
