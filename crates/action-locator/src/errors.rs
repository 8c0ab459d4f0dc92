//! Error types for the locator engine

use perceiver_structural::PerceiverError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a resolution did not produce an element.
///
/// `NoCandidates`, `LowConfidence` and `Timeout` all surface as a hard
/// failure; the detail lives in the debug trace. Cross-origin frames are
/// skipped during scanning and never reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveFailure {
    /// No locator or fallback tier produced a single candidate
    NoCandidates,

    /// Best candidate was hidden or scored below the acceptance floor
    LowConfidence,

    /// Deadline or retry budget ran out
    Timeout,

    /// A frame could not be inspected
    CrossOriginFrameInaccessible,

    /// The caller cancelled the run
    Cancelled,
}

impl ResolveFailure {
    pub fn name(&self) -> &'static str {
        match self {
            ResolveFailure::NoCandidates => "no_candidates",
            ResolveFailure::LowConfidence => "low_confidence",
            ResolveFailure::Timeout => "timeout",
            ResolveFailure::CrossOriginFrameInaccessible => "cross_origin_frame_inaccessible",
            ResolveFailure::Cancelled => "cancelled",
        }
    }
}

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Element not found with any strategy
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Locator value the query engines cannot evaluate
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// Tree inspection failed
    #[error("Perception error: {0}")]
    Perceiver(#[from] PerceiverError),

    /// Capture was asked for something that is not an element
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Timeout during resolution
    #[error("Resolution timeout: {0}")]
    Timeout(String),

    /// Repair hand-off failed or was abandoned
    #[error("Repair failed: {0}")]
    RepairFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::Timeout(_) | LocatorError::ElementNotFound(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Internal(_) => 3,
            LocatorError::Perceiver(_) | LocatorError::Timeout(_) => 2,
            LocatorError::ElementNotFound(_)
            | LocatorError::RepairFailed(_)
            | LocatorError::CaptureFailed(_) => 1,
            LocatorError::InvalidLocator { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_errors_are_low_severity() {
        let err = LocatorError::from(PerceiverError::InvalidXPath("//[".into()));
        assert_eq!(err.severity(), 2);
        assert!(!err.is_retryable());

        let err = LocatorError::InvalidLocator {
            locator: "css:div[".into(),
            reason: "unterminated attribute".into(),
        };
        assert_eq!(err.severity(), 0);
    }

    #[test]
    fn failure_names_are_snake_case() {
        assert_eq!(ResolveFailure::LowConfidence.name(), "low_confidence");
        assert_eq!(
            serde_json::to_value(ResolveFailure::NoCandidates).unwrap(),
            serde_json::json!("no_candidates")
        );
    }
}
