use std::path::PathBuf;

use action_flow::{GuideRecorder, RecordedEvent};
use anyhow::{bail, Context, Result};
use clap::Args;
use nexaura_core_types::{FrameId, FrameInfo, Guide};
use perceiver_structural::DomTree;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::{load_dom, write_json};

#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
    /// Guide name
    pub name: String,

    /// DOM snapshot (JSON) the interactions happen on
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// CSS selector of an element to click (repeatable, in order)
    #[arg(long = "step", value_name = "SELECTOR", required = true)]
    pub steps: Vec<String>,

    /// Record the last step as a form submission
    #[arg(long)]
    pub submit_last: bool,

    /// Write the guide here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

pub async fn cmd_record(args: RecordArgs, ctx: &CliContext) -> Result<()> {
    let dom = load_dom(&args.dom).await?;
    let frame = FrameInfo::new(FrameId::top().0, dom.location());
    let mut recorder = GuideRecorder::new(args.name.clone()).with_capture(ctx.config().capture.clone());

    let last = args.steps.len().saturating_sub(1);
    for (index, selector) in args.steps.iter().enumerate() {
        let matches = dom
            .query_selector_all(selector)
            .with_context(|| format!("evaluating selector '{}'", selector))?;
        let Some(node) = matches.first().copied() else {
            bail!("step {}: selector '{}' matched nothing", index + 1, selector);
        };
        let event = if args.submit_last && index == last {
            RecordedEvent::Submit
        } else {
            RecordedEvent::Click
        };
        let step = recorder
            .record(dom.as_ref(), node, event, frame.clone())
            .await
            .with_context(|| format!("recording step {}", index + 1))?;
        info!(step = step.step_number, instruction = %step.instruction, "recorded");
    }

    let guide = recorder.finish()?;
    if let Some(out) = &args.out {
        write_json(out, &guide).await?;
        info!("Wrote guide to {}", out.display());
    }
    emit(ctx.output(), &guide, render_guide)
}

fn render_guide(guide: &Guide) -> String {
    let mut lines = vec![format!("{} ({} steps)", guide.name, guide.steps.len())];
    for step in &guide.steps {
        lines.push(format!(
            "  {}. [{}] {}",
            step.step_number,
            step.action.name(),
            step.instruction
        ));
    }
    lines.join("\n")
}
