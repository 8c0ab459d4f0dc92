use std::path::PathBuf;
use std::time::Duration;

use action_locator::{
    EscalationOutcome, LocatorEngine, ResolveFailure, ResolvedElement, ResolvedVia,
    SelfHealingResolver,
};
use anyhow::Result;
use clap::Args;
use nexaura_core_types::{DebugTrace, Target};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::{load_dom, page_session, read_json, VisionArgs};

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// DOM snapshot (JSON)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// Recorded target (JSON)
    #[arg(long, value_name = "FILE")]
    pub target: PathBuf,

    /// Overall deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Extra attempts after the first
    #[arg(long)]
    pub retries: Option<u32>,

    /// Include the debug trace in human output
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub vision: VisionArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<ResolvedVia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ResolvedElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResolveFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub debug: DebugTrace,
    #[serde(skip)]
    show_trace: bool,
}

impl ResolveReport {
    fn from_outcome(outcome: EscalationOutcome, show_trace: bool) -> Self {
        match outcome {
            EscalationOutcome::Resolved { element, via, attempts, debug } => Self {
                status: "resolved",
                via: Some(via),
                element: Some(element),
                failure: None,
                error: None,
                attempts,
                debug,
                show_trace,
            },
            EscalationOutcome::NeedsRepair { resolution } => Self {
                status: "needs_repair",
                via: None,
                element: None,
                failure: resolution.failure,
                error: resolution.error,
                attempts: resolution.attempts,
                debug: resolution.debug,
                show_trace,
            },
            EscalationOutcome::Skipped { debug } => Self {
                status: "skipped",
                via: None,
                element: None,
                failure: Some(ResolveFailure::Cancelled),
                error: None,
                attempts: 0,
                debug,
                show_trace,
            },
        }
    }
}

pub async fn cmd_resolve(args: ResolveArgs, ctx: &CliContext) -> Result<()> {
    let dom = load_dom(&args.dom).await?;
    let target: Target = read_json(&args.target).await?;

    let mut options = ctx.config().resolve_options();
    if let Some(ms) = args.timeout_ms {
        options.timeout = Duration::from_millis(ms);
    }
    if let Some(retries) = args.retries {
        options.retries = retries;
    }

    let resolver = SelfHealingResolver::new(LocatorEngine::new(), args.vision.build(&ctx.config().vision));
    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt(cancel.clone());

    let outcome = resolver.resolve(&page_session(&dom), &target, &options, &cancel).await;
    interrupt.abort();

    let report = ResolveReport::from_outcome(outcome, args.trace);
    info!(status = report.status, "resolution finished");
    emit(ctx.output(), &report, render_report)
}

/// Cancels `token` on Ctrl-C.
pub(crate) fn spawn_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn render_report(report: &ResolveReport) -> String {
    let mut lines = Vec::new();
    match &report.element {
        Some(element) => lines.push(format!(
            "{} node {} <{}> in frame {} via {:?} ({}, score {:.2})",
            report.status,
            element.node.0,
            element.tag.as_deref().unwrap_or("?"),
            element.frame,
            report.via.unwrap_or(ResolvedVia::Locator),
            element.matched_by,
            element.score
        )),
        None => lines.push(format!(
            "{}: {} after {} attempt(s)",
            report.status,
            report.error.as_deref().unwrap_or("cancelled"),
            report.attempts
        )),
    }
    if report.show_trace {
        for entry in report.debug.entries() {
            lines.push(format!("  [{:?}] {}", entry.level, entry.message));
        }
    }
    lines.join("\n")
}
