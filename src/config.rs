//! Engine configuration
//!
//! TOML file support with environment variable overrides and defaults.
//! Every setting the engine reads is carried explicitly in an
//! `EngineConfig` value handed to `AggregationEngine::new`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::PartitionKey;
use crate::error::{Error, Result};

/// Aggregation engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Extra column prefix used when joining (`<prefix>_<key>_<column>`)
    #[serde(default)]
    pub prefix: String,

    /// Group partial results by concat key
    #[serde(default = "default_true")]
    pub concat: bool,

    /// Fan out over this key instead of running sequentially
    #[serde(default)]
    pub partition: Option<PartitionKey>,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            concat: default_true(),
            partition: None,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Serialization(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `SPACETIME_PREFIX`, `SPACETIME_CONCAT` and `SPACETIME_PARTITION`
    ///
    /// `SPACETIME_PARTITION=none` (or an empty value) clears the partition key.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(prefix) = std::env::var("SPACETIME_PREFIX") {
            self.prefix = prefix;
        }
        if let Ok(concat) = std::env::var("SPACETIME_CONCAT") {
            self.concat = concat.trim().parse().map_err(|_| {
                Error::config(format!("SPACETIME_CONCAT must be true or false, got '{}'", concat))
            })?;
        }
        if let Ok(partition) = std::env::var("SPACETIME_PARTITION") {
            let partition = partition.trim();
            self.partition = if partition.is_empty() || partition.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(partition.parse()?)
            };
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.prefix.chars().any(char::is_whitespace) {
            return Err(Error::config(format!(
                "column prefix '{}' cannot contain whitespace",
                self.prefix
            )));
        }
        if self.prefix.ends_with('_') {
            return Err(Error::config(
                "column prefix must not end with '_'; the separator is added automatically",
            ));
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }
}
