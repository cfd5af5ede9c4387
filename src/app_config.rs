use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use crate::language_utils::MatchPolicy;

/// Application configuration module
/// This module handles loading and validating the settings of an embedding
/// run. Every field has a default, so a config file may set any subset.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EmbedConfig {
    /// How an identifier is recognised as already registered
    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Keep the temporary transform file when a run fails
    #[serde(default)]
    pub keep_temp_on_failure: bool,

    /// File name prefix of the temporary transform
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    // @returns: Matching filter for the log facade
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_temp_prefix() -> String {
    "CELT".to_string()
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfig {
            match_policy: MatchPolicy::default(),
            keep_temp_on_failure: false,
            temp_prefix: default_temp_prefix(),
            log_level: LogLevel::default(),
        }
    }
}

impl EmbedConfig {
    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {:?}", path))?;

        let reader = BufReader::new(file);
        let config: EmbedConfig = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.temp_prefix.is_empty() {
            return Err(anyhow!("Temporary file prefix must not be empty"));
        }

        if self.temp_prefix.contains(['/', '\\']) {
            return Err(anyhow!(
                "Temporary file prefix must not contain path separators: {}",
                self.temp_prefix
            ));
        }

        Ok(())
    }
}
