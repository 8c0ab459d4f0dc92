//! Layered configuration: built-in defaults, a YAML file, then
//! `NEXAURA__SECTION__KEY` environment overrides.

use std::path::{Path, PathBuf};

use action_flow::PlaybackOptions;
use action_locator::{CaptureOptions, ResolveOptions, ScoringWeights};
use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use perceiver_visual::VisionOptions;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "NEXAURA";
const LOCAL_CONFIG: &str = "config/nexaura.yaml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexauraConfig {
    pub resolve: ResolveOptions,
    /// Overrides `resolve.weights` when present in the file
    pub scoring: Option<ScoringWeights>,
    pub capture: CaptureOptions,
    pub vision: VisionOptions,
    pub playback: PlaybackOptions,
    pub logging: LoggingConfig,
}

impl NexauraConfig {
    /// Resolve options with the scoring section folded in.
    pub fn resolve_options(&self) -> ResolveOptions {
        let mut options = self.resolve.clone();
        if let Some(weights) = &self.scoring {
            options.weights = weights.clone();
        }
        options
    }

    pub fn validate(&self) -> Result<()> {
        let resolve = &self.resolve;
        anyhow::ensure!(resolve.timeout.as_millis() > 0, "resolve.timeout must be positive");
        anyhow::ensure!(
            resolve.acceptance_floor.is_finite(),
            "resolve.acceptance_floor must be a finite number"
        );
        anyhow::ensure!(
            resolve.quiet_period <= resolve.stability_timeout,
            "resolve.quiet_period cannot exceed resolve.stability_timeout"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.vision.min_score),
            "vision.min_score must be within 0..=1"
        );
        anyhow::ensure!(self.capture.max_ancestors > 0, "capture.max_ancestors must be positive");
        anyhow::ensure!(self.playback.step_timeout_ms > 0, "playback.step_timeout_ms must be positive");
        self.logging
            .level
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("logging.level '{}' is not a level", self.logging.level))?;
        Ok(())
    }
}

pub struct LoadedConfig {
    pub config: NexauraConfig,
    /// File the values came from, `None` when only defaults applied
    pub path: Option<PathBuf>,
}

/// Priority: `--config FILE` > ./config/nexaura.yaml > ~/.config/nexaura/config.yaml
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("nexaura");
        dir.push("config.yaml");
        candidates.push(dir);
    }
    candidates
}

pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "config file {} does not exist", path.display());
    }
    let path = config_candidates(explicit).into_iter().find(|path| path.exists());

    let mut builder = config::Config::builder();
    if let Some(path) = &path {
        builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Yaml));
    }
    let layered = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to assemble configuration")?;
    let config: NexauraConfig = layered
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(LoadedConfig { config, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    #[serial]
    fn defaults_apply_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(load_config(Some(&missing)).is_err());

        let config = NexauraConfig::default();
        assert_eq!(config.resolve.retries, 3);
        assert_eq!(config.playback.step_retries, 1);
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn file_values_and_env_overrides_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "resolve:\n  timeout: 3000\n  retries: 1\nscoring:\n  text_exact: 5.0\nlogging:\n  format: json"
        )
        .unwrap();

        std::env::set_var("NEXAURA__RESOLVE__RETRIES", "7");
        let loaded = load_config(Some(file.path()));
        std::env::remove_var("NEXAURA__RESOLVE__RETRIES");
        let loaded = loaded.unwrap();

        assert_eq!(loaded.path.as_deref(), Some(file.path()));
        let config = loaded.config;
        assert_eq!(config.resolve.timeout, Duration::from_secs(3));
        assert_eq!(config.resolve.retries, 7);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.resolve_options().weights.text_exact, 5.0);
        assert_eq!(config.resolve.acceptance_floor, 2.0);
    }

    #[test]
    fn validation_rejects_inverted_stability_windows() {
        let mut config = NexauraConfig::default();
        config.resolve.quiet_period = Duration::from_secs(5);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quiet_period"));
    }
}
