pub mod capture;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod frames;
pub mod migrate;
pub mod output;
pub mod record;
pub mod replay;
pub mod resolve;
pub mod runtime;
pub mod score;
pub mod snapshot;

pub use commands::Commands;
pub use context::CliContext;
pub use dispatch::dispatch;
pub use env::CliArgs;
pub use output::OutputFormat;
