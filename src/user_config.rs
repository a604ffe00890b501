use crate::error::{MeasureError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_WAIT_TO_FLUSH_SECS: u64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Daemon API key; falls back to $DD_API_KEY when unset
    pub api_key: Option<String>,
    /// Extra static tags attached to every metric
    pub tags: Vec<String>,
    /// Append runtime/flow/run/step/user (and project) tags
    pub include_identity_tags: bool,
    /// Print diagnostic lines to stdout
    pub verbose: bool,
    /// Let the daemon write to our stdout/stderr and its default log file
    pub debug_daemon: bool,
    /// Extra daemon environment (e.g. DD_SITE); part of the fingerprint
    pub daemon_config: BTreeMap<String, String>,
    /// Seconds to wait after the final flush in disposable containers (0 disables)
    pub wait_to_flush: u64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            tags: Vec::new(),
            include_identity_tags: true,
            verbose: false,
            debug_daemon: false,
            daemon_config: BTreeMap::new(),
            wait_to_flush: DEFAULT_WAIT_TO_FLUSH_SECS,
        }
    }
}

impl MeasureConfig {
    /// $MEASURE_CONFIG_DIR/config.toml or ~/.config/measure/config.toml
    pub fn config_path() -> PathBuf {
        crate::clienv::config_dir().join("config.toml")
    }

    /// Load from `path`, or the default location when `None`. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);
        tracing::trace!(path = %path.display(), "Loading measure config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            MeasureError::Config(format!("Failed to read config from {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)?;

        tracing::trace!(
            tags = config.tags.len(),
            daemon_config = config.daemon_config.len(),
            wait_to_flush = config.wait_to_flush,
            "Measure config loaded"
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Configured API key, else $DD_API_KEY. Empty strings count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(crate::clienv::api_key)
    }

    pub fn flush_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.wait_to_flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeasureConfig::default();
        assert!(config.include_identity_tags);
        assert_eq!(config.wait_to_flush, 20);
        assert!(config.daemon_config.is_empty());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = MeasureConfig::parse(
            r#"
            api_key = "abc"
            tags = ["team:ml"]
            wait_to_flush = 0

            [daemon_config]
            DD_SITE = "datadoghq.eu"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.tags, vec!["team:ml"]);
        assert_eq!(config.wait_to_flush, 0);
        assert!(config.include_identity_tags);
        assert_eq!(
            config.daemon_config.get("DD_SITE").map(String::as_str),
            Some("datadoghq.eu")
        );
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(MeasureConfig::parse("wait_to_flush = \"soon\"").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeasureConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.wait_to_flush, 20);
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = MeasureConfig {
            api_key: Some("explicit".into()),
            ..Default::default()
        };
        assert_eq!(config.resolved_api_key().as_deref(), Some("explicit"));
    }
}
