use anyhow::Result;
use clap::Parser;
use nexaura_cli::cli::{dispatch, runtime, CliArgs, CliContext};
use nexaura_cli::config::load_config;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    let loaded = load_config(cli.config.as_deref())?;
    runtime::init_logging(&cli, &loaded.config.logging)?;

    match &loaded.path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => debug!("No configuration file found; using defaults"),
    }

    let ctx = CliContext::new(loaded.config, loaded.path, cli.output);
    dispatch(&cli, &ctx).await
}
