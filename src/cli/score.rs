use std::path::PathBuf;

use action_locator::{candidate_text, CandidateScorer, ScoreBreakdown};
use anyhow::{Context, Result};
use clap::Args;
use nexaura_core_types::{StepAction, Target};
use perceiver_structural::{DomTree, NodeId};
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::{load_dom, read_json};

#[derive(Args, Clone, Debug)]
pub struct ScoreArgs {
    /// DOM snapshot (JSON)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// Recorded target (JSON)
    #[arg(long, value_name = "FILE")]
    pub target: PathBuf,

    /// Limit candidates to this selector; defaults to the recorded tag
    #[arg(long)]
    pub selector: Option<String>,

    /// Step action enabling the click affordance signals
    #[arg(long, value_parser = parse_action)]
    pub action: Option<StepAction>,

    /// Candidates to show
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}

#[derive(Debug, Serialize)]
pub struct ScoredCandidate {
    pub node: NodeId,
    pub tag: String,
    pub text: String,
    pub score: ScoreBreakdown,
}

pub async fn cmd_score(args: ScoreArgs, ctx: &CliContext) -> Result<()> {
    let dom = load_dom(&args.dom).await?;
    let target: Target = read_json(&args.target).await?;
    let tree: &dyn DomTree = dom.as_ref();

    let nodes = match &args.selector {
        Some(selector) => tree
            .query_selector_all(selector)
            .with_context(|| format!("evaluating selector '{}'", selector))?,
        None if target.fingerprint.has_known_tag() => {
            let tag = target.fingerprint.tag.as_str();
            tree.query(&|node| tree.tag_name(node).as_deref() == Some(tag))
        }
        None => tree.all_elements(),
    };

    let scorer = CandidateScorer::new(ctx.config().resolve_options().weights).with_action(args.action);
    let mut rows: Vec<ScoredCandidate> = nodes
        .into_iter()
        .map(|node| ScoredCandidate {
            node,
            tag: tree.tag_name(node).unwrap_or_default(),
            text: candidate_text(tree, node),
            score: scorer.breakdown(tree, node, &target),
        })
        .collect();
    rows.sort_by(|a, b| b.score.total.total_cmp(&a.score.total));
    rows.truncate(args.top);

    emit(ctx.output(), &rows, |rows| render_rows(rows))
}

pub(crate) fn parse_action(raw: &str) -> Result<StepAction, String> {
    match raw.to_ascii_lowercase().as_str() {
        "click" => Ok(StepAction::Click),
        "type" => Ok(StepAction::Type),
        "submit" => Ok(StepAction::Submit),
        other => Err(format!("unknown action '{other}' (click, type, submit)")),
    }
}

fn render_rows(rows: &[ScoredCandidate]) -> String {
    if rows.is_empty() {
        return "no candidates".to_string();
    }
    let mut lines = Vec::new();
    for row in rows {
        lines.push(format!(
            "{:>8.2}  node {:<4} <{}> {}",
            row.score.total, row.node.0, row.tag, row.text
        ));
        let signals: Vec<String> = row
            .score
            .signals
            .iter()
            .map(|signal| format!("{}={:+.2}", signal.name, signal.value))
            .collect();
        lines.push(format!("          {}", signals.join(" ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_case_insensitively() {
        assert_eq!(parse_action("Type"), Ok(StepAction::Type));
        assert!(parse_action("hover").is_err());
    }
}
