//! Core types shared by the samplers, the scanner and the stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Byte counter snapshot of one interface
///
/// Created on every sample and compared pairwise to derive rates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStats {
    /// Interface name as reported by the OS
    pub name: String,
    /// Total bytes received
    pub rx_bytes: u64,
    /// Total bytes sent
    pub tx_bytes: u64,
    /// When the counters were read
    pub timestamp: DateTime<Utc>,
}

/// A neighbor observed on the local segment
///
/// Identity is the MAC; the IP may migrate between scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Neighbor address (IPv4 from ARP, link-local IPv6 from NDP)
    pub ip: IpAddr,
    /// Canonical lowercase colon-separated MAC ("xx:xx:xx:xx:xx:xx")
    pub mac: String,
    /// Round-trip time of the last successful probe
    pub latency_ms: Option<u64>,
    /// Time of the discovery event that produced this record
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Create a device record without a latency value
    pub fn new(ip: IpAddr, mac: impl Into<String>, last_seen: DateTime<Utc>) -> Self {
        Self {
            ip,
            mac: mac.into(),
            latency_ms: None,
            last_seen,
        }
    }
}

/// Outcome of one on-demand bandwidth sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthResult {
    /// Primary interface at sample time
    pub interface: String,
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub timestamp: DateTime<Utc>,
    /// No previous sample existed; rates are zero
    pub first_measurement: bool,
}
