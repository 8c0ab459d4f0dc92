//! Guide playback: walks the steps, pauses on failure and hands hard
//! failures to the repair broker when one is attached.
//!
//! Commands mirror what a playback panel offers: start, retry the paused
//! step, skip it, cancel. Every state change is published on a watch
//! channel so the panel can render the session without polling.

use std::sync::Arc;

use action_locator::{
    CaptureOptions, PageSession, RepairBroker, RepairOutcome, RepairRequest, RepairSession,
};
use nexaura_core_types::{Guide, Step};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::FlowError;
use crate::executor::StepExecutor;
use crate::state::{LogLevel, PlaybackSession, RunnerState, StepResult, StepStatus};

struct RepairDesk {
    broker: Arc<dyn RepairBroker>,
    session: RepairSession,
}

pub struct PlaybackRunner {
    guide: Mutex<Guide>,
    executor: StepExecutor,
    page: PageSession,
    repair: Option<RepairDesk>,
    session_tx: watch::Sender<PlaybackSession>,
    cancel: Mutex<CancellationToken>,
}

impl PlaybackRunner {
    pub fn new(guide: Guide, executor: StepExecutor, page: PageSession) -> Self {
        let (session_tx, _session_rx) = watch::channel(PlaybackSession::new(&guide));
        Self {
            guide: Mutex::new(guide),
            executor,
            page,
            repair: None,
            session_tx,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Consult `broker` when a step fails every resolution tier.
    pub fn with_repair(mut self, broker: Arc<dyn RepairBroker>, capture: CaptureOptions) -> Self {
        let max_repairs = self.executor.options().max_repairs;
        self.repair = Some(RepairDesk {
            broker,
            session: RepairSession::new(capture, max_repairs),
        });
        self
    }

    /// Receiver that always holds the latest session snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.session_tx.subscribe()
    }

    pub fn session(&self) -> PlaybackSession {
        self.session_tx.borrow().clone()
    }

    /// The guide with repaired targets and updated locator history.
    pub fn guide(&self) -> Guide {
        self.guide.lock().clone()
    }

    pub async fn start(&self) -> Result<PlaybackSession, FlowError> {
        let state = self.session().state;
        if matches!(state, RunnerState::RunningStep | RunnerState::Finished) {
            return Err(FlowError::InvalidState { command: "start", state });
        }
        self.ensure_steps()?;
        let from = self.session().step_index;
        Ok(self.run_from(from).await)
    }

    /// Re-runs the paused step.
    pub async fn retry(&self) -> Result<PlaybackSession, FlowError> {
        let session = self.session();
        if session.state != RunnerState::Paused {
            return Err(FlowError::InvalidState {
                command: "retry",
                state: session.state,
            });
        }
        Ok(self.run_from(session.step_index).await)
    }

    /// Moves past the current step without running it.
    pub async fn skip(&self) -> Result<PlaybackSession, FlowError> {
        let session = self.session();
        if session.state == RunnerState::RunningStep || session.state.is_terminal() {
            return Err(FlowError::InvalidState {
                command: "skip",
                state: session.state,
            });
        }
        self.ensure_steps()?;
        self.publish(|s| {
            s.append_log(LogLevel::Info, format!("Step {} skipped", s.step_index + 1))
        });
        Ok(self.run_from(session.step_index + 1).await)
    }

    /// Stops the running step; the session ends up `CANCELLED`.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
        self.publish(|s| s.state = RunnerState::Cancelled);
    }

    fn ensure_steps(&self) -> Result<(), FlowError> {
        if self.guide.lock().steps.is_empty() {
            return Err(FlowError::EmptyGuide);
        }
        Ok(())
    }

    fn publish(&self, update: impl FnOnce(&mut PlaybackSession)) {
        self.session_tx.send_modify(update);
    }

    fn step_at(&self, index: usize) -> Option<Step> {
        self.guide.lock().steps.get(index).cloned()
    }

    async fn run_from(&self, mut index: usize) -> PlaybackSession {
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        loop {
            if cancel.is_cancelled() {
                self.publish(|s| s.state = RunnerState::Cancelled);
                break;
            }
            let Some(step) = self.step_at(index) else {
                let total = self.guide.lock().steps.len();
                info!(target: "action-flow::runner", steps = total, "guide finished");
                self.publish(|s| {
                    s.state = RunnerState::Finished;
                    s.step_index = total;
                });
                break;
            };

            self.publish(|s| {
                s.state = RunnerState::RunningStep;
                s.step_index = index;
            });
            info!(target: "action-flow::runner", step = index + 1, instruction = %step.instruction, "running step");

            let result = self.executor.execute(&step, &self.page, &cancel).await;
            match result.status {
                StepStatus::Success => {
                    self.record_success(index, &result);
                    index += 1;
                    self.publish(|s| {
                        s.step_index = index;
                        s.append_log(LogLevel::Info, format!("Step {index} success"));
                    });
                }
                StepStatus::Skipped => {
                    self.publish(|s| {
                        s.state = RunnerState::Cancelled;
                        s.last_error = result.error.clone();
                    });
                    break;
                }
                StepStatus::HardFail if self.try_repair(index, &step, &result, &cancel).await => {
                    // repaired, told to retry or cancelled: back to the loop head
                }
                StepStatus::HardFail | StepStatus::RecoverableFail => {
                    let error = result.error.clone().unwrap_or_else(|| "failed".to_string());
                    warn!(target: "action-flow::runner", step = index + 1, %error, "step failed; pausing");
                    self.publish(|s| {
                        s.state = RunnerState::Paused;
                        s.append_log(LogLevel::Warn, format!("Step {} failed: {error}", index + 1));
                        s.last_error = Some(error);
                    });
                    break;
                }
            }
        }
        self.session()
    }

    fn record_success(&self, index: usize, result: &StepResult) {
        let Some(key) = result.locator_key.as_deref() else {
            return;
        };
        if let Some(step) = self.guide.lock().steps.get_mut(index) {
            step.target.history.record_success(key);
        }
    }

    /// `true` when the step should be run again right away. A cancel while
    /// waiting on the broker also returns `true` so the loop head sees it.
    async fn try_repair(
        &self,
        index: usize,
        step: &Step,
        result: &StepResult,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(desk) = &self.repair else {
            return false;
        };
        if !desk.session.is_available(index) {
            return false;
        }

        let screenshot = step
            .target
            .vision
            .template_id
            .clone()
            .or_else(|| step.screenshot.clone());
        let request = RepairRequest::new(index, step.instruction.clone())
            .with_screenshot(screenshot)
            .with_debug(result.debug.clone())
            .with_failure(result.failure);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(target: "action-flow::runner", step = index + 1, "repair abandoned by cancel");
                return true;
            }
            outcome = desk.session.request(desk.broker.as_ref(), request) => outcome,
        };
        match outcome {
            Ok(RepairOutcome::Replaced { target }) => {
                if let Some(step) = self.guide.lock().steps.get_mut(index) {
                    step.replace_target(target);
                }
                self.publish(|s| {
                    s.append_log(LogLevel::Info, format!("Step {} repaired", index + 1))
                });
                true
            }
            Ok(RepairOutcome::Retry) => true,
            Ok(RepairOutcome::Abandoned | RepairOutcome::Exhausted) => false,
            Err(err) => {
                warn!(target: "action-flow::runner", step = index + 1, error = %err, "repair failed");
                false
            }
        }
    }
}
