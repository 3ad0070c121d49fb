//! File-based controller configuration.

use std::path::Path;
use std::time::Duration;

use converge_queue::RateLimiterConfig;
use converge_store::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Controller settings as read from a TOML file.
///
/// ```toml
/// namespace = "prod"
/// concurrency = 4
/// max_retries = 10
/// resync_period_secs = 300
/// label_selector = "app=web"
///
/// [rate_limit]
/// base_delay_ms = 5
/// qps = 10.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Namespace to watch. Empty watches all namespaces.
    #[serde(default)]
    pub namespace: String,

    /// Number of worker tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Ordinary failures retried before a key is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Informer resync interval. Zero disables resync.
    #[serde(default)]
    pub resync_period_secs: u64,

    #[serde(default = "default_cache_sync_timeout_secs")]
    pub cache_sync_timeout_secs: u64,

    #[serde(default)]
    pub label_selector: String,

    #[serde(default)]
    pub rate_limit: RateLimiterConfig,
}

const fn default_concurrency() -> usize {
    1
}

const fn default_max_retries() -> u32 {
    10
}

const fn default_cache_sync_timeout_secs() -> u64 {
    120
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            resync_period_secs: 0,
            cache_sync_timeout_secs: default_cache_sync_timeout_secs(),
            label_selector: String::new(),
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the document does not parse or
    /// fails validation.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges and the label selector syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::invalid_config("concurrency must be at least 1"));
        }
        if self.cache_sync_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "cache_sync_timeout_secs must be at least 1",
            ));
        }
        self.rate_limit
            .validate()
            .map_err(|e| Error::invalid_config(format!("rate_limit: {e}")))?;
        self.selector()?;
        Ok(())
    }

    /// The parsed label selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the selector does not parse.
    pub fn selector(&self) -> Result<LabelSelector> {
        LabelSelector::parse(&self.label_selector)
            .map_err(|e| Error::invalid_config(format!("label_selector: {e}")))
    }

    pub fn resync_period(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.resync_period_secs)).filter(|d| !d.is_zero())
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.resync_period(), None);
    }

    #[test]
    fn test_full_document() {
        let config = ControllerConfig::from_toml_str(
            r#"
            namespace = "prod"
            concurrency = 4
            max_retries = 3
            resync_period_secs = 30
            label_selector = "app=web,!legacy"

            [rate_limit]
            base_delay_ms = 10
            qps = 50.0
            "#,
        )
        .unwrap();

        assert_eq!(config.namespace, "prod");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.resync_period(), Some(Duration::from_secs(30)));
        assert_eq!(config.rate_limit.base_delay_ms, 10);
        assert_eq!(config.rate_limit.burst, 100);
        assert_eq!(config.selector().unwrap().to_string(), "app=web,!legacy");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(ControllerConfig::from_toml_str("concurrency = 0").is_err());
        assert!(ControllerConfig::from_toml_str("label_selector = \"=x\"").is_err());
        assert!(ControllerConfig::from_toml_str("[rate_limit]\nqps = 0.0").is_err());
        assert!(ControllerConfig::from_toml_str("[rate_limit]\nqps = nan").is_err());
        assert!(ControllerConfig::from_toml_str("[rate_limit]\nburst = 0").is_err());
        assert!(
            ControllerConfig::from_toml_str("[rate_limit]\nbase_delay_ms = 10\nmax_delay_ms = 1")
                .is_err()
        );
        assert!(matches!(
            ControllerConfig::from_toml_str("concurrency = \"many\""),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace = \"staging\"").unwrap();

        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.namespace, "staging");

        assert!(ControllerConfig::from_file("/nonexistent/converge.toml").is_err());
    }
}
