//! User configuration settings
//!
//! Layered configuration: defaults → config file → environment variables

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::git::GitRunner;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum concurrent git subprocesses. Git serializes internally on
    /// some operations, so this should stay small (4-8).
    pub max_concurrent_git: usize,

    /// Per-subprocess timeout in seconds
    pub command_timeout_secs: u64,

    /// Default commit window for the graph view
    pub graph_limit: usize,

    /// Default merge window for the merge tree
    pub tree_limit: usize,

    /// Default number of contributors returned by the stats view
    pub top_contributors: usize,

    /// Enable debug logging
    pub debug: bool,

    /// Log file path (if set, logs to file instead of stderr)
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_git: 6,
            command_timeout_secs: 10,
            graph_limit: 500,
            tree_limit: 200,
            top_contributors: 10,
            debug: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Layer config file if it exists
            .merge(Toml::file(&config_path))
            // Layer environment variables (GITSCOPE_MAX_CONCURRENT_GIT, etc.)
            .merge(Env::prefixed("GITSCOPE_"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(parent.to_path_buf()))
            })?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        std::fs::write(&config_path, toml)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    /// Build a [`GitRunner`] sized from this configuration
    pub fn runner(&self) -> GitRunner {
        GitRunner::with_max_concurrent(self.max_concurrent_git)
            .with_timeout(Duration::from_secs(self.command_timeout_secs))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "gitscope", "gitscope").ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_git, 6);
        assert_eq!(config.command_timeout_secs, 10);
        assert_eq!(config.graph_limit, 500);
        assert_eq!(config.tree_limit, 200);
        assert_eq!(config.top_contributors, 10);
        assert!(!config.debug);
    }

    #[test]
    fn test_runner_from_config() {
        let config = Config {
            max_concurrent_git: 4,
            ..Config::default()
        };
        let runner = config.runner();
        assert_eq!(runner.max_concurrent(), 4);
    }
}
