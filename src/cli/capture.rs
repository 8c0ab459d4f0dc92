use std::path::PathBuf;

use action_locator::capture_target;
use anyhow::{Context, Result};
use clap::Args;
use nexaura_core_types::{FrameId, FrameInfo, Target};
use perceiver_structural::DomTree;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::{load_dom, write_json, NodeArgs};

#[derive(Args, Clone, Debug)]
pub struct CaptureArgs {
    /// DOM snapshot (JSON)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    #[command(flatten)]
    pub node: NodeArgs,

    /// Frame id recorded with the target
    #[arg(long)]
    pub frame_id: Option<String>,

    /// Also write the target to this file
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

pub async fn cmd_capture(args: CaptureArgs, ctx: &CliContext) -> Result<()> {
    let dom = load_dom(&args.dom).await?;
    let node = args.node.select(dom.as_ref())?;
    let frame = FrameInfo::new(
        args.frame_id.clone().unwrap_or_else(|| FrameId::top().0),
        dom.location(),
    );
    let target = capture_target(dom.as_ref(), node, frame, &ctx.config().capture)
        .with_context(|| format!("node {} cannot be captured", node.0))?;

    if let Some(out) = &args.out {
        write_json(out, &target).await?;
        info!("Wrote target to {}", out.display());
    }
    emit(ctx.output(), &target, render_target)
}

pub(crate) fn render_target(target: &Target) -> String {
    let fingerprint = &target.fingerprint;
    let mut lines = vec![format!(
        "<{}> {}",
        fingerprint.tag,
        fingerprint.text.as_deref().unwrap_or("")
    )];
    lines.push("locators:".to_string());
    for locator in &target.preferred_locators {
        let filter = locator
            .text_filter
            .as_deref()
            .map(|f| format!(" [text={f}]"))
            .unwrap_or_default();
        lines.push(format!("  {:.2}  {}{}", locator.confidence, locator.key(), filter));
    }
    if let Some(container) = target.container_text() {
        lines.push(format!("container: {container}"));
    }
    if let Some(anchor) = &target.anchor {
        lines.push(format!("anchor: {:?} \"{}\"", anchor.relation, anchor.text));
    }
    let trail: Vec<&str> = target
        .context
        .ancestor_trail
        .iter()
        .map(|segment| segment.tag.as_str())
        .collect();
    if !trail.is_empty() {
        lines.push(format!("trail: {}", trail.join(" > ")));
    }
    lines.join("\n")
}
