//! Playback session state shared with subscribers.

use std::fmt;

use action_locator::{ResolveFailure, ResolvedVia};
use chrono::Utc;
use nexaura_core_types::{DebugTrace, Guide, SessionId};
use serde::{Deserialize, Serialize};

/// Entries kept in [`PlaybackSession::logs`]; older ones are dropped.
pub const MAX_SESSION_LOGS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    #[default]
    Idle,
    RunningStep,
    Paused,
    Finished,
    Cancelled,
}

impl RunnerState {
    pub fn name(&self) -> &'static str {
        match self {
            RunnerState::Idle => "IDLE",
            RunnerState::RunningStep => "RUNNING_STEP",
            RunnerState::Paused => "PAUSED",
            RunnerState::Finished => "FINISHED",
            RunnerState::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunnerState::Finished | RunnerState::Cancelled)
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Success,
    /// Action-level failure; the element was found
    RecoverableFail,
    /// Every resolution tier failed
    HardFail,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    /// Milliseconds since the Unix epoch
    pub ts: i64,
    pub level: LogLevel,
    pub message: String,
}

/// Snapshot of one guide being played back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub session_id: SessionId,
    #[serde(default)]
    pub guide_id: Option<String>,
    pub step_index: usize,
    pub state: RunnerState,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub logs: Vec<SessionLog>,
}

impl PlaybackSession {
    pub fn new(guide: &Guide) -> Self {
        Self {
            session_id: SessionId::new(),
            guide_id: guide.id.clone(),
            step_index: 0,
            state: RunnerState::Idle,
            last_error: None,
            logs: Vec::new(),
        }
    }

    pub fn append_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(SessionLog {
            ts: Utc::now().timestamp_millis(),
            level,
            message: message.into(),
        });
        if self.logs.len() > MAX_SESSION_LOGS {
            let excess = self.logs.len() - MAX_SESSION_LOGS;
            self.logs.drain(..excess);
        }
    }
}

/// What one step execution produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResolveFailure>,
    /// Locator that found the element, when one did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<ResolvedVia>,
    pub attempts: u32,
    pub debug: DebugTrace,
}

impl StepResult {
    pub fn success(locator_key: Option<String>, via: ResolvedVia, attempts: u32, debug: DebugTrace) -> Self {
        Self {
            status: StepStatus::Success,
            error: None,
            failure: None,
            locator_key,
            via: Some(via),
            attempts,
            debug,
        }
    }

    pub fn failed(status: StepStatus, error: impl Into<String>, attempts: u32, debug: DebugTrace) -> Self {
        Self {
            status,
            error: Some(error.into()),
            failure: None,
            locator_key: None,
            via: None,
            attempts,
            debug,
        }
    }

    pub fn skipped(attempts: u32, debug: DebugTrace) -> Self {
        Self {
            failure: Some(ResolveFailure::Cancelled),
            ..Self::failed(StepStatus::Skipped, "cancelled", attempts, debug)
        }
    }

    pub fn with_failure(mut self, failure: Option<ResolveFailure>) -> Self {
        self.failure = failure;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_keep_the_latest_fifty() {
        let mut session = PlaybackSession::new(&Guide::new("Pay invoice"));
        for i in 0..60 {
            session.append_log(LogLevel::Info, format!("entry {i}"));
        }
        assert_eq!(session.logs.len(), MAX_SESSION_LOGS);
        assert_eq!(session.logs[0].message, "entry 10");
        assert_eq!(session.logs[49].message, "entry 59");
    }

    #[test]
    fn states_serialize_like_their_display() {
        let json = serde_json::to_string(&RunnerState::RunningStep).unwrap();
        assert_eq!(json, "\"RUNNING_STEP\"");
        assert_eq!(RunnerState::RunningStep.to_string(), "RUNNING_STEP");
        assert!(RunnerState::Cancelled.is_terminal());
        assert!(!RunnerState::Paused.is_terminal());
    }
}
