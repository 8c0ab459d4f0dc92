use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use nexaura_core_types::FrameId;
use perceiver_structural::{scan_frames, DomTree};
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::load_dom;

#[derive(Args, Clone, Debug)]
pub struct FramesArgs {
    /// DOM snapshot (JSON)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRow {
    pub frame_id: FrameId,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub elements: usize,
}

pub async fn cmd_frames(args: FramesArgs, ctx: &CliContext) -> Result<()> {
    let dom = load_dom(&args.dom).await?;
    let rows: Vec<FrameRow> = scan_frames(dom as Arc<dyn DomTree>)
        .into_iter()
        .map(|handle| FrameRow {
            elements: handle.document.all_elements().len(),
            frame_id: handle.frame_id,
            depth: handle.depth,
            href: handle.href,
        })
        .collect();

    emit(ctx.output(), &rows, |rows| {
        rows.iter()
            .map(|row| {
                format!(
                    "{:<6} depth {}  {:>4} elements  {}",
                    row.frame_id.to_string(),
                    row.depth,
                    row.elements,
                    row.href.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}
