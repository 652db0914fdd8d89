//! Runtime configuration loaded from `~/.config/vidparse/config.toml`.
//!
//! Precedence, lowest first: built-in defaults, the config file,
//! `VIDPARSE_*` environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const ENV_DB_PATH: &str = "VIDPARSE_DB_PATH";
pub const ENV_TIMEOUT_SECS: &str = "VIDPARSE_TIMEOUT_SECS";
pub const ENV_LOG: &str = "VIDPARSE_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite audit log location.
    pub db_path: PathBuf,
    /// Deadline for one whole resolution.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Record every resolution attempt in the audit log.
    pub audit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            log_level: "warn".to_string(),
            audit: true,
        }
    }
}

impl Config {
    /// Load the user config file and apply environment overrides.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if an environment override is malformed.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(&config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse `path`, or defaults when it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Apply `VIDPARSE_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.db_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.is_empty()) {
            self.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT_SECS} must be whole seconds, got {secs:?}"))?;
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        Ok(())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Return the path to the config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidparse")
        .join("config.toml")
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("vidparse")
        .join("parse.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.audit);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
db_path = "/var/lib/vidparse/parse.db"
timeout_secs = 12
audit = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/vidparse/parse.db"));
        assert_eq!(config.timeout_secs, 12);
        assert!(!config.audit);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_DB_PATH, "/tmp/audit.db"),
            (ENV_TIMEOUT_SECS, " 5 "),
            (ENV_LOG, "vidparse=debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/audit.db"));
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.log_level, "vidparse=debug");
    }

    #[test]
    fn malformed_timeout_env_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()));
        assert!(result.is_err());
    }
}
