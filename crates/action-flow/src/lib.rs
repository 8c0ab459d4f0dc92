//! Guide recording and playback
//!
//! Records interactions as guide steps and plays guides back one step at a
//! time on top of the self-healing resolver, pausing for the user whenever
//! a step cannot be completed.

pub mod errors;
pub mod executor;
pub mod recorder;
pub mod runner;
pub mod state;

pub use errors::FlowError;
pub use executor::{
    ActionPerformer, DelegatedResult, DryRunPerformer, FrameDelegate, PerformedAction,
    PlaybackOptions, StepExecutor,
};
pub use recorder::{GuideRecorder, RecordedEvent, StepDraft, StepNamer};
pub use runner::PlaybackRunner;
pub use state::{
    LogLevel, PlaybackSession, RunnerState, SessionLog, StepResult, StepStatus, MAX_SESSION_LOGS,
};
