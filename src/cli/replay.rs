use std::path::PathBuf;
use std::sync::Arc;

use action_flow::{
    DryRunPerformer, PerformedAction, PlaybackRunner, PlaybackSession, RunnerState, StepExecutor,
};
use action_locator::{LocatorEngine, SelfHealingResolver};
use anyhow::{Context, Result};
use clap::Args;
use nexaura_core_types::Guide;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::{load_dom, page_session, read_json, write_json, VisionArgs};

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// Guide to play (JSON, current schema)
    #[arg(long, value_name = "FILE")]
    pub guide: PathBuf,

    /// DOM snapshot (JSON) the steps run against
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// Skip failing steps instead of stopping at the first one
    #[arg(long)]
    pub skip_failed: bool,

    /// Write the guide with updated locator history here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub vision: VisionArgs,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub session: PlaybackSession,
    pub performed: Vec<PerformedAction>,
    pub skipped: Vec<usize>,
}

pub async fn cmd_replay(args: ReplayArgs, ctx: &CliContext) -> Result<()> {
    let guide: Guide = read_json(&args.guide).await?;
    guide
        .validate()
        .with_context(|| format!("guide {} is invalid", args.guide.display()))?;
    let dom = load_dom(&args.dom).await?;

    let config = ctx.config();
    let performer = Arc::new(DryRunPerformer::new());
    let resolver = SelfHealingResolver::new(LocatorEngine::new(), args.vision.build(&config.vision));
    let executor = StepExecutor::new(resolver, performer.clone())
        .with_resolve_options(config.resolve_options())
        .with_options(config.playback.clone());
    let runner = Arc::new(PlaybackRunner::new(guide, executor, page_session(&dom)));

    let interrupt = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                runner.cancel();
            }
        })
    };

    let mut skipped = Vec::new();
    let mut session = runner.start().await?;
    while args.skip_failed && session.state == RunnerState::Paused {
        warn!(
            step = session.step_index + 1,
            error = session.last_error.as_deref().unwrap_or(""),
            "skipping failed step"
        );
        skipped.push(session.step_index);
        session = runner.skip().await?;
    }
    interrupt.abort();
    info!(state = %session.state, steps = performer.performed().len(), "replay finished");

    if let Some(out) = &args.out {
        write_json(out, &runner.guide()).await?;
        info!("Wrote guide to {}", out.display());
    }

    let report = ReplayReport {
        session,
        performed: performer.performed(),
        skipped,
    };
    emit(ctx.output(), &report, render_report)
}

fn render_report(report: &ReplayReport) -> String {
    let session = &report.session;
    let mut lines = vec![format!("{} at step {}", session.state, session.step_index + 1)];
    if let Some(error) = &session.last_error {
        lines.push(format!("last error: {error}"));
    }
    for action in &report.performed {
        lines.push(format!(
            "  {} node {} <{}> in frame {}{}",
            action.action.name(),
            action.node.0,
            action.tag.as_deref().unwrap_or("?"),
            action.frame,
            action
                .value
                .as_deref()
                .map(|v| format!(" = \"{v}\""))
                .unwrap_or_default()
        ));
    }
    for index in &report.skipped {
        lines.push(format!("  skipped step {}", index + 1));
    }
    lines.join("\n")
}
