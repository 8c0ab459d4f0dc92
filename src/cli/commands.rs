use clap::Subcommand;

use super::capture::CaptureArgs;
use super::config::ConfigArgs;
use super::frames::FramesArgs;
use super::migrate::MigrateArgs;
use super::record::RecordArgs;
use super::replay::ReplayArgs;
use super::resolve::ResolveArgs;
use super::score::ScoreArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Capture a target for an element of a DOM snapshot
    Capture(CaptureArgs),

    /// Record a guide by clicking elements of a DOM snapshot
    Record(RecordArgs),

    /// Resolve a recorded target against a DOM snapshot
    Resolve(ResolveArgs),

    /// Show per-signal scores of candidate elements for a target
    Score(ScoreArgs),

    /// List the frames reachable from a DOM snapshot
    Frames(FramesArgs),

    /// Play a guide back against a DOM snapshot without touching a browser
    Replay(ReplayArgs),

    /// Upgrade a legacy guide to the current schema
    Migrate(MigrateArgs),

    /// Inspect and validate the Nexaura configuration
    Config(ConfigArgs),
}
