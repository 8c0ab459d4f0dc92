use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::config::config_candidates;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Validate the effective configuration
    Validate,

    /// Show where configuration is looked up
    Path,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let format = match ctx.output() {
                OutputFormat::Human => OutputFormat::Yaml,
                other => other,
            };
            emit(format, ctx.config(), |_| String::new())?;
        }
        ConfigAction::Validate => {
            ctx.config().validate()?;
            match ctx.config_path() {
                Some(path) => println!("Configuration file {} is valid", path.display()),
                None => println!("No configuration file found; defaults are valid"),
            }
        }
        ConfigAction::Path => {
            let active = ctx.config_path();
            for candidate in config_candidates(None) {
                let marker = if Some(candidate.as_path()) == active { "*" } else { " " };
                println!("{marker} {}", candidate.display());
            }
            if let Some(path) = active {
                if !config_candidates(None).iter().any(|c| c.as_path() == path) {
                    println!("* {}", path.display());
                }
            }
        }
    }
    Ok(())
}
