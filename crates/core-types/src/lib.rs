//! Shared primitives for the Nexaura locator engine.
//!
//! Everything in here is plain data: it must round-trip through JSON so that
//! recorded guides can be persisted by whatever storage layer hosts the
//! engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod debug;
pub mod geometry;
pub mod guide;
pub mod target;
pub mod text;

pub use debug::{DebugEntry, DebugLevel, DebugTrace};
pub use geometry::BoundingBox;
pub use guide::{
    migrate_guide, migrate_step, Guide, LegacyGuide, LegacyStep, SchemaError, Step, StepAction,
    GUIDE_VERSION,
};
pub use target::{
    AnchorRelation, AncestorSegment, Fingerprint, FrameInfo, Locator, LocatorHistory,
    LocatorKind, NearbyAnchor, RelationAnchor, Target, TargetContext, VisionHint, UNKNOWN_TAG,
};
pub use text::{normalize_text, truncate_chars};

/// Identifies one playback session (one tab running one guide).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a frame within the page, `"0"` for the top document and
/// `"<depth>:<index>"` for nested frames.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub String);

impl FrameId {
    pub fn top() -> Self {
        Self("0".to_string())
    }

    pub fn nested(depth: usize, index: usize) -> Self {
        Self(format!("{depth}:{index}"))
    }

    pub fn is_top(&self) -> bool {
        self.0 == "0"
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_ids_follow_depth_index_scheme() {
        assert!(FrameId::top().is_top());
        assert_eq!(FrameId::nested(1, 2).to_string(), "1:2");
        assert!(!FrameId::nested(1, 0).is_top());
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
