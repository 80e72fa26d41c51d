//! Configuration for revtun
//!
//! The relay connection settings live in a TOML file under the revtun
//! config directory. The registry file, the registry lock, and the
//! per-tunnel handshake logs live next to it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Get the revtun configuration directory.
///
/// Honors `REVTUN_CONFIG_DIR` when set, so callers (and tests) can
/// redirect all persisted state.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("REVTUN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("revtun")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Path of the persisted tunnel registry
pub fn registry_path() -> PathBuf {
    default_config_dir().join("tunnels")
}

/// Path of the registry lock file
pub fn lock_path() -> PathBuf {
    default_config_dir().join("tunnels.lock")
}

/// Directory holding per-tunnel handshake capture logs
pub fn log_dir() -> PathBuf {
    default_config_dir().join("logs")
}

/// Helper module for Duration serialization as seconds
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Relay connection and handshake settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay host the reverse forwards are opened on
    pub relay_host: String,

    /// Username on the relay
    pub relay_user: String,

    /// SSH port on the relay
    pub relay_port: u16,

    /// ssh client binary to invoke
    pub ssh_binary: String,

    /// SSH connect timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Number of handshake poll attempts
    pub poll_attempts: u32,

    /// Interval between handshake polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Bounded wait for the registry lock
    #[serde(with = "duration_secs")]
    pub lock_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_host: "relay.example.com".to_string(),
            relay_user: "tunnel".to_string(),
            relay_port: 22,
            ssh_binary: "ssh".to_string(),
            connect_timeout: Duration::from_secs(10),
            poll_attempts: 20,
            poll_interval_ms: 500,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Interval between handshake polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `user@host` destination argument for the ssh client
    pub fn destination(&self) -> String {
        format!("{}@{}", self.relay_user, self.relay_host)
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_usable() {
        let config = RelayConfig::default();
        assert_eq!(config.ssh_binary, "ssh");
        assert!(config.poll_attempts > 0);
        assert_eq!(config.destination(), "tunnel@relay.example.com");
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = RelayConfig::default();
        config.relay_host = "relay.internal".to_string();
        config.lock_timeout = Duration::from_secs(5);

        save_config(&path, &config).unwrap();
        let loaded: RelayConfig = load_config(&path).unwrap();

        assert_eq!(loaded.relay_host, "relay.internal");
        assert_eq!(loaded.lock_timeout, Duration::from_secs(5));
        assert_eq!(loaded.relay_port, config.relay_port);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "relay_host = \"r.example.net\"\n").unwrap();

        let loaded: RelayConfig = load_config(&path).unwrap();
        assert_eq!(loaded.relay_host, "r.example.net");
        assert_eq!(loaded.ssh_binary, "ssh");
        assert_eq!(loaded.poll_attempts, 20);
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config::<RelayConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
