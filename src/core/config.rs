use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::errors::{DacError, Result};
use crate::project::ProjectFormat;

/// How an unbound Data-typed parameter picks among several candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Take the first candidate (local pool before Global, insertion order)
    #[default]
    First,
    /// Never pick implicitly; every Data parameter must be bound by the caller
    RequireExplicit,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub ansi: bool,
    #[serde(default)]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
            with_target: false,
        }
    }
}

/// Top-level configuration of a dac session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DacConfig {
    /// Registry document to load; the bundled default registry when absent
    #[serde(default)]
    pub registry: Option<PathBuf>,
    /// Fail session start-up when any registry entry could not be loaded
    #[serde(default)]
    pub strict_plugins: bool,
    /// Candidate selection for unbound Data parameters
    #[serde(default)]
    pub candidates: CandidatePolicy,
    /// Format used when a project file's extension does not decide it
    #[serde(default)]
    pub project_format: ProjectFormat,
    #[serde(default)]
    pub log: LogConfig,
}

impl DacConfig {
    /// Read a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DacError::io(format!("read config {}", path.display()), e))?;
        let mut config: Self = serde_yaml::from_str(&text)?;

        // Relative registry paths are relative to the config file
        if let (Some(registry), Some(dir)) = (config.registry.as_mut(), path.parent()) {
            if registry.is_relative() {
                *registry = dir.join(&*registry);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values
    pub fn validate(&self) -> Result<()> {
        if self.log.level.trim().is_empty() {
            return Err(DacError::configuration_field(
                "log level cannot be empty",
                "log.level",
            ));
        }
        if let Some(registry) = &self.registry {
            if registry.as_os_str().is_empty() {
                return Err(DacError::configuration_field(
                    "registry path cannot be empty",
                    "registry",
                ));
            }
        }
        Ok(())
    }
}
