//! Configuration for senders, the registry and logging.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Throttled delivery settings
    pub sender: SenderConfig,
    /// Dispatcher registry settings
    pub registry: RegistryConfig,
    /// Logging settings
    pub log: LogConfig,
}

impl PulseConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults when the file is missing.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Throttled sender configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Minimum time between two deliveries to one transport
    pub cooldown_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self { cooldown_ms: 100 }
    }
}

impl SenderConfig {
    /// Cooldown window as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Set the cooldown window.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = cooldown.as_millis() as u64;
        self
    }
}

/// Dispatcher registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Optional expiry for registered sessions (None = until unregistered)
    pub ttl_secs: Option<u64>,
}

impl RegistryConfig {
    /// Expiry as a duration.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `pulse_progress=debug`
    pub level: String,
    /// Directory for the log file (defaults to the working directory)
    pub directory: Option<PathBuf>,
    /// Log file name; no file logging when unset
    pub file: Option<String>,
    /// Also log to stdout when a file is configured
    pub stdout: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file: None,
            stdout: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PulseConfig::default();
        assert_eq!(config.sender.cooldown(), Duration::from_millis(100));
        assert_eq!(config.registry.ttl(), None);
        assert_eq!(config.log.level, "info");
        assert!(config.log.stdout);
        assert!(config.log.file.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sender": {{"cooldown_ms": 250}}, "log": {{"level": "debug"}}}}"#).unwrap();

        let config = PulseConfig::load(file.path()).unwrap();
        assert_eq!(config.sender.cooldown(), Duration::from_millis(250));
        assert_eq!(config.log.level, "debug");
        assert!(config.log.stdout);
        assert_eq!(config.registry, RegistryConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = PulseConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, PulseConfig::default());
        assert!(matches!(
            PulseConfig::load(dir.path().join("absent.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(PulseConfig::load(file.path()), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_with_cooldown() {
        let sender = SenderConfig::default().with_cooldown(Duration::from_millis(20));
        assert_eq!(sender.cooldown_ms, 20);
    }
}
