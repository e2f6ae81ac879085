//! Configuration file support for sentineld
//!
//! Loads and validates sentineld configuration from TOML files.
//! Default location: /etc/sentinel/sentineld.toml

use crate::bandwidth::DEFAULT_IGNORED_PREFIXES;
use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sentinel/sentineld.toml";

/// Scan scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Seconds between scan cycle starts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-probe reply deadline in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound on concurrently executing probes
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Devices unseen for longer than this are evicted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

/// Bandwidth sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthConfig {
    /// Interface name prefixes never chosen as primary
    #[serde(default = "default_ignored_prefixes")]
    pub ignored_prefixes: Vec<String>,
}

/// Neighbor table command configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// IPv4 ARP table command (program followed by arguments)
    #[serde(default = "default_arp_command")]
    pub arp_command: Vec<String>,

    /// IPv6 NDP table command (program followed by arguments)
    #[serde(default = "default_ndp_command")]
    pub ndp_command: Vec<String>,
}

/// HTTP API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Listen address for the HTTP server
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Devices seen within this many seconds are reported as active
    #[serde(default = "default_active_window_secs")]
    pub active_window_secs: u64,
}

/// Complete sentineld configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub bandwidth: BandwidthConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

// Default functions
fn default_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_ignored_prefixes() -> Vec<String> {
    DEFAULT_IGNORED_PREFIXES.iter().map(|p| p.to_string()).collect()
}

fn default_arp_command() -> Vec<String> {
    vec!["arp".to_string(), "-an".to_string()]
}

fn default_ndp_command() -> Vec<String> {
    vec!["ndp".to_string(), "-an".to_string()]
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_active_window_secs() -> u64 {
    600
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrent_probes: default_max_concurrent_probes(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl ScannerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            ignored_prefixes: default_ignored_prefixes(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            arp_command: default_arp_command(),
            ndp_command: default_ndp_command(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            active_window_secs: default_active_window_secs(),
        }
    }
}

impl ApiConfig {
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_secs)
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            SentinelError::Config(format!("invalid listen_addr {:?}: {}", self.listen_addr, e))
        })
    }
}

impl SentinelConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SentinelError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SentinelError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SentinelError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scanner.interval_secs == 0 {
            return Err(SentinelError::Config(
                "scanner.interval_secs must be > 0".to_string(),
            ));
        }

        if self.scanner.probe_timeout_ms == 0 {
            return Err(SentinelError::Config(
                "scanner.probe_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.scanner.max_concurrent_probes == 0 {
            return Err(SentinelError::Config(
                "scanner.max_concurrent_probes must be > 0".to_string(),
            ));
        }

        if self.discovery.arp_command.is_empty() || self.discovery.ndp_command.is_empty() {
            return Err(SentinelError::Config(
                "discovery commands must name a program".to_string(),
            ));
        }

        if self.bandwidth.ignored_prefixes.iter().any(String::is_empty) {
            // An empty prefix would match every interface
            return Err(SentinelError::Config(
                "bandwidth.ignored_prefixes must not contain empty entries".to_string(),
            ));
        }

        self.api.socket_addr()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SentinelConfig::default();
        assert_eq!(config.scanner.interval(), Duration::from_secs(30));
        assert_eq!(config.scanner.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.scanner.max_concurrent_probes, 16);
        assert_eq!(config.scanner.retention(), Duration::from_secs(3600));
        assert_eq!(config.api.active_window(), Duration::from_secs(600));
        assert_eq!(config.api.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.discovery.arp_command, vec!["arp", "-an"]);
        assert_eq!(
            config.bandwidth.ignored_prefixes,
            vec!["lo", "lo0", "awdl0", "llw0", "utun", "bridge"]
        );
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(SentinelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = SentinelConfig::default();
        config.scanner.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.scanner.max_concurrent_probes = 0;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.scanner.probe_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_listen_addr() {
        let mut config = SentinelConfig::default();
        config.api.listen_addr = "not-an-address".to_string();
        assert!(matches!(config.validate(), Err(SentinelError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_command_and_prefix() {
        let mut config = SentinelConfig::default();
        config.discovery.ndp_command.clear();
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.bandwidth.ignored_prefixes.push(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[scanner]
interval_secs = 10

[api]
listen_addr = "127.0.0.1:9090"
"#;
        let config: SentinelConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scanner.interval_secs, 10);
        assert_eq!(config.api.listen_addr, "127.0.0.1:9090");
        // Unspecified values should use defaults
        assert_eq!(config.scanner.probe_timeout_ms, 2000);
        assert_eq!(config.api.active_window_secs, 600);
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentineld.toml");

        let mut config = SentinelConfig::default();
        config.scanner.max_concurrent_probes = 4;
        config.discovery.arp_command = vec!["ip".into(), "neigh".into(), "show".into()];
        config.save(&path).unwrap();

        let loaded = SentinelConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SentinelConfig::load_or_default("/nonexistent/sentineld.toml").unwrap();
        assert_eq!(config, SentinelConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[scanner\ninterval_secs = ").unwrap();
        let result = SentinelConfig::load_or_default(file.path());
        assert!(matches!(result, Err(SentinelError::Config(_))));
    }
}
