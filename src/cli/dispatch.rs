use super::capture::cmd_capture;
use super::config::cmd_config;
use super::env::CliArgs;
use super::frames::cmd_frames;
use super::migrate::cmd_migrate;
use super::record::cmd_record;
use super::replay::cmd_replay;
use super::resolve::cmd_resolve;
use super::score::cmd_score;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Capture(args) => cmd_capture(args, ctx).await,
        Commands::Record(args) => cmd_record(args, ctx).await,
        Commands::Resolve(args) => cmd_resolve(args, ctx).await,
        Commands::Score(args) => cmd_score(args, ctx).await,
        Commands::Frames(args) => cmd_frames(args, ctx).await,
        Commands::Replay(args) => cmd_replay(args, ctx).await,
        Commands::Migrate(args) => cmd_migrate(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
    }
}
