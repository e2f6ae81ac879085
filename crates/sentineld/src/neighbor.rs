//! Neighbor table discovery (ARP for IPv4, NDP for IPv6)
//!
//! Two sources are read per discovery call. The primary (ARP) table must be
//! readable; the secondary (NDP) table is optional and an unavailable command
//! counts as an empty table. Each line is matched against a source-specific
//! pattern, the MAC is normalized and validated, and results are
//! deduplicated by MAC with the primary source winning.

use crate::config::DiscoveryConfig;
use crate::error::{Result, SentinelError};
use crate::mac::parse_mac;
use crate::shell;
use crate::types::Device;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{debug, instrument};

/// `? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]`
///
/// The address must be a whole whitespace-delimited token of exactly six octets.
static ARP_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\((\d{1,3}(?:\.\d{1,3}){3})\)\s+at\s+([0-9A-Fa-f]{1,2}(?:[:-][0-9A-Fa-f]{1,2}){5})(?:\s|$)",
    )
    .expect("Invalid ARP line pattern")
});

/// `fe80::a:b:c:d%en0  0:11:22:33:44:55  en0 23h59m58s S R`
static NDP_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9A-Fa-f:]+)(?:%\S+)?\s+([0-9A-Fa-f]{1,2}(?:[:-][0-9A-Fa-f]{1,2}){5})(?:\s|$)",
    )
    .expect("Invalid NDP line pattern")
});

/// A raw neighbor table: anything that can produce the textual table output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NeighborSource: Send + Sync {
    /// Read the full table as text.
    async fn read_table(&self) -> Result<String>;
}

/// Neighbor source backed by an external command (`arp -an`, `ndp -an`).
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    /// Build from an argv-style list; the first element is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SentinelError::Config("neighbor command must not be empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Rendered command line
    pub fn command_line(&self) -> String {
        shell::display_command(&self.program, &self.args)
    }
}

#[async_trait]
impl NeighborSource for CommandSource {
    async fn read_table(&self) -> Result<String> {
        shell::exec_checked(&self.program, &self.args).await
    }
}

/// Discovers neighbors from a primary (ARP) and secondary (NDP) source.
#[derive(Clone)]
pub struct NeighborDiscovery {
    primary: Arc<dyn NeighborSource>,
    secondary: Arc<dyn NeighborSource>,
}

impl NeighborDiscovery {
    /// Create from explicit sources
    pub fn new(primary: Arc<dyn NeighborSource>, secondary: Arc<dyn NeighborSource>) -> Self {
        Self { primary, secondary }
    }

    /// Create command-backed sources from configuration
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        let primary = CommandSource::from_argv(&config.arp_command)?;
        let secondary = CommandSource::from_argv(&config.ndp_command)?;
        debug!(
            primary = %primary.command_line(),
            secondary = %secondary.command_line(),
            "Configured neighbor sources"
        );
        Ok(Self::new(Arc::new(primary), Arc::new(secondary)))
    }

    /// Read both tables and return the deduplicated device list.
    ///
    /// Fails with [`SentinelError::Discovery`] only when the primary table
    /// cannot be read.
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Result<Vec<Device>> {
        let arp_output = self
            .primary
            .read_table()
            .await
            .map_err(|e| SentinelError::Discovery(format!("ARP table unavailable: {}", e)))?;

        let ndp_output = match self.secondary.read_table().await {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "NDP table unavailable, continuing with ARP only");
                String::new()
            }
        };

        let now = Utc::now();
        let devices = merge_unique(
            parse_arp_table(&arp_output, now),
            parse_ndp_table(&ndp_output, now),
        );

        debug!(count = devices.len(), "Discovered neighbors");
        Ok(devices)
    }
}

/// Parse ARP table output into devices; non-matching lines are skipped.
pub fn parse_arp_table(output: &str, now: DateTime<Utc>) -> Vec<Device> {
    output
        .lines()
        .filter_map(|line| {
            let caps = ARP_LINE_RE.captures(line)?;
            let ip: Ipv4Addr = caps[1].parse().ok()?;
            let mac = parse_mac(&caps[2])?;
            Some(Device::new(IpAddr::V4(ip), mac, now))
        })
        .collect()
}

/// Parse NDP table output into devices, keeping only link-local addresses.
pub fn parse_ndp_table(output: &str, now: DateTime<Utc>) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.to_ascii_lowercase().starts_with("neighbor"))
        .filter_map(|line| {
            let caps = NDP_LINE_RE.captures(line)?;
            let ip: Ipv6Addr = caps[1].parse().ok()?;
            if !is_ipv6_link_local(&ip) {
                return None;
            }
            let mac = parse_mac(&caps[2])?;
            Some(Device::new(IpAddr::V6(ip), mac, now))
        })
        .collect()
}

/// Concatenate device lists keeping the first occurrence of every MAC.
pub fn merge_unique(primary: Vec<Device>, secondary: Vec<Device>) -> Vec<Device> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(secondary)
        .filter(|device| seen.insert(device.mac.clone()))
        .collect()
}

/// Check if IPv6 address is link-local (fe80::/10, i.e. fe80 through febf)
#[inline]
pub fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
