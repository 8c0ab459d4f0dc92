//! Single-step execution: resolve the recorded target, then act on it.

use std::sync::Arc;
use std::time::Duration;

use action_locator::{
    EscalationOutcome, PageSession, ResolveOptions, ResolvedElement, SelfHealingResolver,
};
use async_trait::async_trait;
use nexaura_core_types::{DebugTrace, FrameId, FrameInfo, Step, StepAction};
use parking_lot::Mutex;
use perceiver_structural::NodeId;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::state::{StepResult, StepStatus};

/// Step-level playback tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    /// Extra attempts after the first failed one
    pub step_retries: u32,
    /// Upper bound for performing the action once the element is found
    pub step_timeout_ms: u64,
    /// Backoff unit between attempts, multiplied by the attempt number
    pub retry_delay_ms: u64,
    /// Repair hand-offs allowed per step
    pub max_repairs: u32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            step_retries: 1,
            step_timeout_ms: 10_000,
            retry_delay_ms: 200,
            max_repairs: 1,
        }
    }
}

impl PlaybackOptions {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Performs the recorded interaction on a resolved element.
#[async_trait]
pub trait ActionPerformer: Send + Sync {
    async fn perform(
        &self,
        action: StepAction,
        element: &ResolvedElement,
        value: Option<&str>,
    ) -> Result<(), FlowError>;
}

/// Answer relayed back from the frame that owns a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedResult {
    pub status: StepStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub locator_key: Option<String>,
    #[serde(default)]
    pub debug: DebugTrace,
}

impl DelegatedResult {
    fn into_step_result(self) -> StepResult {
        StepResult {
            status: self.status,
            error: self.error,
            failure: None,
            locator_key: self.locator_key,
            via: None,
            attempts: 1,
            debug: self.debug,
        }
    }
}

/// Hands a step to the script running inside the frame it was recorded in.
#[async_trait]
pub trait FrameDelegate: Send + Sync {
    async fn resolve_remote(
        &self,
        frame: &FrameInfo,
        step: &Step,
        options: &ResolveOptions,
    ) -> Result<DelegatedResult, FlowError>;
}

/// One performed interaction, as seen by [`DryRunPerformer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformedAction {
    pub action: StepAction,
    pub node: NodeId,
    pub frame: FrameId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Records actions instead of dispatching them; used for offline replays.
#[derive(Debug, Default)]
pub struct DryRunPerformer {
    performed: Mutex<Vec<PerformedAction>>,
}

impl DryRunPerformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn performed(&self) -> Vec<PerformedAction> {
        self.performed.lock().clone()
    }
}

#[async_trait]
impl ActionPerformer for DryRunPerformer {
    async fn perform(
        &self,
        action: StepAction,
        element: &ResolvedElement,
        value: Option<&str>,
    ) -> Result<(), FlowError> {
        self.performed.lock().push(PerformedAction {
            action,
            node: element.node,
            frame: element.frame.clone(),
            tag: element.tag.clone(),
            value: value.map(str::to_string),
        });
        Ok(())
    }
}

/// Runs one step with step-level retries on top of the resolver's own.
pub struct StepExecutor {
    resolver: SelfHealingResolver,
    performer: Arc<dyn ActionPerformer>,
    delegate: Option<Arc<dyn FrameDelegate>>,
    resolve: ResolveOptions,
    options: PlaybackOptions,
}

impl StepExecutor {
    pub fn new(resolver: SelfHealingResolver, performer: Arc<dyn ActionPerformer>) -> Self {
        Self {
            resolver,
            performer,
            delegate: None,
            resolve: ResolveOptions::default(),
            options: PlaybackOptions::default(),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn FrameDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_resolve_options(mut self, resolve: ResolveOptions) -> Self {
        self.resolve = resolve;
        self
    }

    pub fn with_options(mut self, options: PlaybackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PlaybackOptions {
        &self.options
    }

    pub async fn execute(
        &self,
        step: &Step,
        page: &PageSession,
        cancel: &CancellationToken,
    ) -> StepResult {
        let recorded = &step.target.context.frame;
        if recorded.conflicts_with(&page.current_frame) {
            match &self.delegate {
                Some(delegate) => return self.delegate_step(delegate.as_ref(), step, cancel).await,
                None => debug!(
                    target: "action-flow::executor",
                    recorded = ?recorded.id,
                    current = ?page.current_frame.id,
                    "frame mismatch without a delegate; searching from here"
                ),
            }
        }

        let options = self.resolve.clone().for_action(step.action);
        let mut debug = DebugTrace::new();
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return StepResult::skipped(attempts, debug);
            }
            attempts += 1;
            let mut result = self.run_once(step, page, &options, cancel).await;
            debug.extend(std::mem::take(&mut result.debug));

            let done = matches!(result.status, StepStatus::Success | StepStatus::Skipped);
            if done || attempts > self.options.step_retries {
                result.attempts = attempts;
                result.debug = debug;
                return result;
            }

            let error = result.error.unwrap_or_default();
            warn!(target: "action-flow::executor", attempts, %error, "step attempt failed");
            debug.warn(format!("attempt {attempts} failed: {error}"));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StepResult::skipped(attempts, debug),
                _ = sleep(self.options.retry_delay() * attempts) => {}
            }
        }
    }

    async fn run_once(
        &self,
        step: &Step,
        page: &PageSession,
        options: &ResolveOptions,
        cancel: &CancellationToken,
    ) -> StepResult {
        let (element, via, mut debug) = match self.resolver.resolve(page, &step.target, options, cancel).await {
            EscalationOutcome::Resolved { element, via, debug, .. } => (element, via, debug),
            EscalationOutcome::Skipped { debug } => return StepResult::skipped(0, debug),
            EscalationOutcome::NeedsRepair { resolution } => {
                let error = resolution.error.unwrap_or_else(|| "element not found".to_string());
                return StepResult::failed(StepStatus::HardFail, error, 0, resolution.debug)
                    .with_failure(resolution.failure);
            }
        };

        let value = step.value.as_deref();
        let performed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepResult::skipped(0, debug),
            performed = timeout(self.options.step_timeout(), self.performer.perform(step.action, &element, value)) => performed,
        };
        match performed {
            Ok(Ok(())) => {
                info!(
                    target: "action-flow::executor",
                    action = step.action.name(),
                    node = element.node.0,
                    "step performed"
                );
                debug.info(format!("{} performed", step.action.name()));
                StepResult::success(element.locator_key.clone(), via, 0, debug)
            }
            Ok(Err(err)) => {
                debug.error(err.to_string());
                StepResult::failed(StepStatus::RecoverableFail, err.to_string(), 0, debug)
            }
            Err(_) => {
                debug.error("step timeout");
                StepResult::failed(StepStatus::RecoverableFail, "step timeout", 0, debug)
            }
        }
    }

    async fn delegate_step(
        &self,
        delegate: &dyn FrameDelegate,
        step: &Step,
        cancel: &CancellationToken,
    ) -> StepResult {
        let frame = &step.target.context.frame;
        info!(target: "action-flow::executor", frame = ?frame.id, "delegating step to its frame");
        let options = self.resolve.clone().for_action(step.action);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => StepResult::skipped(0, DebugTrace::new()),
            relayed = delegate.resolve_remote(frame, step, &options) => match relayed {
                Ok(result) => result.into_step_result(),
                Err(err) => {
                    warn!(target: "action-flow::executor", error = %err, "frame delegation failed");
                    StepResult::failed(StepStatus::RecoverableFail, err.to_string(), 1, DebugTrace::new())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexaura_core_types::{Fingerprint, Locator, Target};
    use perceiver_structural::{MemoryDom, NodeSpec};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn page() -> PageSession {
        let root = NodeSpec::new("html").rect(0.0, 0.0, 800.0, 600.0).child(
            NodeSpec::new("body").rect(0.0, 0.0, 800.0, 600.0).children(vec![
                NodeSpec::new("input").id("amount").rect(10.0, 10.0, 120.0, 24.0),
                NodeSpec::new("button").id("pay").text("Pay").rect(10.0, 40.0, 60.0, 24.0),
            ]),
        );
        PageSession::new(Arc::new(MemoryDom::from_root("https://shop.example/", root).unwrap()))
    }

    fn step(action: StepAction, id: &str, tag: &str) -> Step {
        let mut target = Target::from_fingerprint(Fingerprint::new(tag));
        target.preferred_locators.push(Locator::id(id, 0.9));
        Step::new(1, action, format!("{} {id}", action.name()), target)
    }

    fn quick() -> ResolveOptions {
        ResolveOptions::default()
            .with_timeout(Duration::from_secs(1))
            .with_retries(0)
    }

    fn executor(performer: Arc<dyn ActionPerformer>) -> StepExecutor {
        StepExecutor::new(SelfHealingResolver::locator_only(), performer).with_resolve_options(quick())
    }

    struct Flaky {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ActionPerformer for Flaky {
        async fn perform(&self, action: StepAction, _: &ResolvedElement, _: Option<&str>) -> Result<(), FlowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FlowError::action(action.name(), "element detached"))
        }
    }

    struct Remote;

    #[async_trait]
    impl FrameDelegate for Remote {
        async fn resolve_remote(&self, frame: &FrameInfo, _: &Step, _: &ResolveOptions) -> Result<DelegatedResult, FlowError> {
            Ok(DelegatedResult {
                status: StepStatus::RecoverableFail,
                error: Some(format!("nothing in {}", frame.id.as_deref().unwrap_or("?"))),
                locator_key: None,
                debug: DebugTrace::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn typing_passes_the_recorded_value() {
        let performer = Arc::new(DryRunPerformer::new());
        let mut typed = step(StepAction::Type, "amount", "input");
        typed.value = Some("42.00".into());

        let result = executor(performer.clone())
            .execute(&typed, &page(), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.locator_key.as_deref(), Some("id:amount"));
        let performed = performer.performed();
        assert_eq!(performed.len(), 1);
        assert_eq!(performed[0].action, StepAction::Type);
        assert_eq!(performed[0].value.as_deref(), Some("42.00"));
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_steps_hard_fail_after_step_retries() {
        let started = Instant::now();
        let result = executor(Arc::new(DryRunPerformer::new()))
            .execute(&step(StepAction::Click, "refund", "button"), &page(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::HardFail);
        assert_eq!(result.attempts, 2);
        assert!(result.debug.contains_message("attempt 1 failed"));
        // one backoff of 200ms between the two attempts
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn action_failures_are_recoverable() {
        let flaky = Arc::new(Flaky { calls: AtomicU32::new(0) });
        let result = executor(flaky.clone())
            .execute(&step(StepAction::Click, "pay", "button"), &page(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::RecoverableFail);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.error.as_deref(), Some("action click failed: element detached"));
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_frame_steps_are_relayed_unchanged() {
        let mut remote = step(StepAction::Click, "pay", "button");
        remote.target.context.frame = FrameInfo::new("1:0", None);

        let result = executor(Arc::new(DryRunPerformer::new()))
            .with_delegate(Arc::new(Remote))
            .execute(&remote, &page(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::RecoverableFail);
        assert_eq!(result.error.as_deref(), Some("nothing in 1:0"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_steps_are_skipped() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let performer = Arc::new(DryRunPerformer::new());
        let result = executor(performer.clone())
            .execute(&step(StepAction::Click, "pay", "button"), &page(), &cancel)
            .await;

        assert_eq!(result.status, StepStatus::Skipped);
        assert!(performer.performed().is_empty());
    }
}
