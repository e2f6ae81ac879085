//! Error types for sentineld
//!
//! The sampler and discovery errors propagate to their callers; the prober
//! errors are absorbed per device by the scanner.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in sentineld
#[derive(Debug, Error)]
pub enum SentinelError {
    /// The OS interface counter query failed
    #[error("Failed to read interface counters: {0}")]
    CounterRead(String),

    /// Every interface was filtered out by the ignore list (or none exist)
    #[error("No eligible network interface found")]
    NoInterface,

    /// The primary neighbor table source is unusable
    #[error("Neighbor discovery failed: {0}")]
    Discovery(String),

    /// Only IPv4 targets can be probed
    #[error("Unsupported probe address: {0}")]
    UnsupportedAddress(IpAddr),

    /// Raw ICMP socket could not be opened or used
    #[error("ICMP socket error: {0}")]
    Socket(#[source] std::io::Error),

    /// No matching echo reply before the read deadline
    #[error("Probe to {ip} timed out after {timeout:?}")]
    Timeout { ip: IpAddr, timeout: Duration },

    /// External command could not be spawned
    #[error("Failed to execute command '{command}': {source}")]
    ShellExec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// External command returned a non-zero exit code
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl SentinelError {
    /// Returns true for errors that only cost a device its latency value.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            SentinelError::UnsupportedAddress(_)
                | SentinelError::Socket(_)
                | SentinelError::Timeout { .. }
        )
    }
}

/// Result type alias for sentineld operations
pub type Result<T> = std::result::Result<T, SentinelError>;
