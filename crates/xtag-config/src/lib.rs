//! # xtag-config
//!
//! Configuration management for xtag.
//!
//! Loads configuration from:
//! 1. `~/.xtag/config.toml` (global)
//! 2. `.xtag/config.toml` (project-local, overrides global)
//! 3. Environment variables `XTAG_HASH` and `XTAG_THREADS`
//!
//! Command-line flags override all of these; that happens in the CLI.

pub mod logging;
pub mod testing;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use xtag_record::Algorithm;

pub use logging::LogLevel;

/// Project-local config path, relative to the working directory.
pub const PROJECT_CONFIG: &str = ".xtag/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: TOML parse error: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid merged configuration: {0}")]
    Merge(#[source] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value \"{value}\" in environment variable {var}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hashing: HashingConfig,
    pub walk: WalkConfig,
    pub errors: ErrorsConfig,
    pub dispatch: DispatchConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Path::new(PROJECT_CONFIG))?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Load and merge the given files. Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        for path in global.into_iter().chain(std::iter::once(project)) {
            if !path.exists() {
                continue;
            }
            debug!(path = %path.display(), "Loading config");
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let table: toml::Table = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
            // Validate each file on its own so errors point at the right path.
            Config::deserialize(toml::Value::Table(table.clone())).map_err(|source| {
                ConfigError::Toml {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            merge_tables(&mut merged, table);
        }

        Config::deserialize(toml::Value::Table(merged)).map_err(ConfigError::Merge)
    }

    /// Global config path: ~/.xtag/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".xtag/config.toml"))
    }

    /// Apply environment overrides, looking variables up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("XTAG_HASH") {
            self.hashing.algorithm = value.parse().map_err(|e: xtag_record::hashing::UnknownAlgorithm| {
                ConfigError::Env {
                    var: "XTAG_HASH",
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(value) = lookup("XTAG_THREADS") {
            let threads: usize = value.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
                var: "XTAG_THREADS",
                value: value.clone(),
                reason: e.to_string(),
            })?;
            self.dispatch.threads = Some(threads);
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }

    /// Render this configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Recursively merge `overlay` into `base`; overlay values win.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Hashing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Algorithm used by `tag` when none is given on the command line
    pub algorithm: Algorithm,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sha256,
        }
    }
}

/// Traversal configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Follow symlinks to directories as well as to files
    pub follow_symlinks: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Treat every soft error as fatal
    pub stop_on_soft_error: bool,
}

/// Worker pool configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of worker threads (None = one per CPU)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hashing.algorithm, Algorithm::Sha256);
        assert!(!config.walk.follow_symlinks);
        assert!(!config.errors.stop_on_soft_error);
        assert_eq!(config.dispatch.threads, None);
        assert_eq!(config.log.level, LogLevel::Error);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[hashing]"));
        assert!(toml_str.contains("algorithm = \"SHA256\""));
        assert!(toml_str.contains("level = \"error\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|var| match var {
                "XTAG_HASH" => Some("sha3_256".to_string()),
                "XTAG_THREADS" => Some("3".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.hashing.algorithm, Algorithm::Sha3_256);
        assert_eq!(config.dispatch.threads, Some(3));

        let err = config
            .apply_env_overrides(|var| (var == "XTAG_THREADS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "XTAG_THREADS", .. }));
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = toml::from_str("[walk]\nfollow_symlinks = true\n[dispatch]\nthreads = 2\n").unwrap();
        let overlay: toml::Table = toml::from_str("[dispatch]\nthreads = 8\n").unwrap();
        merge_tables(&mut base, overlay);

        let config = Config::deserialize(toml::Value::Table(base)).unwrap();
        assert!(config.walk.follow_symlinks);
        assert_eq!(config.dispatch.threads, Some(8));
    }
}
