//! Nexaura command line
//!
//! Exposes the CLI modules and the layered configuration for integration
//! testing.

pub mod cli;
pub mod config;

pub use config::{load_config, LoadedConfig, NexauraConfig};
