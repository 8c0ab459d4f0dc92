use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use nexaura_core_types::{migrate_guide, Guide, LegacyGuide, GUIDE_VERSION};
use serde_json::Value;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::cli::snapshot::{read_json, write_json};

#[derive(Args, Clone, Debug)]
pub struct MigrateArgs {
    /// Guide file, legacy or current
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Write the migrated guide here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

pub async fn cmd_migrate(args: MigrateArgs, ctx: &CliContext) -> Result<()> {
    let raw: Value = read_json(&args.input).await?;
    let version = raw.get("version").and_then(Value::as_u64).unwrap_or(1);

    let guide = if version >= u64::from(GUIDE_VERSION) {
        serde_json::from_value::<Guide>(raw).context("parsing current guide")?
    } else {
        let legacy: LegacyGuide = serde_json::from_value(raw).context("parsing legacy guide")?;
        migrate_guide(legacy, Utc::now().timestamp_millis())
    };
    guide
        .validate()
        .with_context(|| format!("migrated guide '{}' is invalid", guide.name))?;
    info!(from = version, to = GUIDE_VERSION, steps = guide.steps.len(), "guide migrated");

    if let Some(out) = &args.out {
        write_json(out, &guide).await?;
        info!("Wrote guide to {}", out.display());
    }
    emit(ctx.output(), &guide, |guide| {
        format!(
            "{} ({}) v{}: {} step(s)",
            guide.name,
            guide.shortcut,
            guide.version,
            guide.steps.len()
        )
    })
}
