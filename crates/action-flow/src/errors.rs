//! Playback and recording error types

use action_locator::LocatorError;
use nexaura_core_types::SchemaError;
use thiserror::Error;

use crate::state::RunnerState;

/// Playback and recording errors
#[derive(Debug, Error)]
pub enum FlowError {
    /// The guide has nothing to play
    #[error("guide has no steps")]
    EmptyGuide,

    /// Command not allowed in the runner's current state
    #[error("cannot {command} while {state}")]
    InvalidState {
        command: &'static str,
        state: RunnerState,
    },

    /// The page refused or failed the action
    #[error("action {action} failed: {reason}")]
    ActionFailed { action: String, reason: String },

    /// The frame owning the step could not be reached
    #[error("frame delegation failed: {0}")]
    Delegation(String),

    /// Step naming round trip failed
    #[error("step naming failed: {0}")]
    Naming(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::ActionFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Failures worth another step attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::ActionFailed { .. } | FlowError::Delegation(_) => true,
            FlowError::Locator(err) => err.is_retryable(),
            _ => false,
        }
    }
}
