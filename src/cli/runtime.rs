use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::env::CliArgs;
use crate::config::{LogFormat, LoggingConfig};

/// `RUST_LOG` wins, then `--debug`, then `--log-level`, then the config file.
/// Logs go to stderr so command output stays machine readable.
pub fn init_logging(cli: &CliArgs, logging: &LoggingConfig) -> Result<()> {
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        cli.log_level
            .as_deref()
            .unwrap_or(&logging.level)
            .parse()
            .context("Invalid log level")?
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json || logging.format == LogFormat::Json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install log subscriber")?;
    }
    Ok(())
}
