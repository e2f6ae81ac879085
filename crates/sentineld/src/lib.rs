//! LAN telemetry daemon
//!
//! sentineld samples the throughput of the host's primary network interface
//! and keeps an inventory of devices on the local network, each annotated
//! with an ICMP round-trip latency.
//!
//! # Architecture
//!
//! ```text
//!  arp -an / ndp -an          raw ICMP socket          interface counters
//!        |                          |                          |
//!        v                          v                          v
//!  NeighborDiscovery ----> Scanner (fan-out, 16)      BandwidthMonitor
//!                                   |                          |
//!                                   v                          v
//!                              DeviceStore                MetricsStore
//!                                   \                         /
//!                                    +---- HTTP API (axum) --+
//! ```
//!
//! The scanner runs on a fixed interval until its cancellation token fires.
//! Bandwidth is sampled only when `/api/bandwidth` is requested.

pub mod api;
pub mod bandwidth;
pub mod config;
pub mod error;
pub mod latency;
pub mod mac;
pub mod metrics;
pub mod neighbor;
pub mod scanner;
pub mod shell;
pub mod store;
pub mod types;

pub use api::{AppState, router, serve};
pub use bandwidth::{BandwidthMonitor, BandwidthSampler, CounterSource, InterfaceCounter, rate};
pub use config::SentinelConfig;
pub use error::{Result, SentinelError};
pub use latency::{IcmpProber, IcmpSequence, LatencyProbe};
pub use metrics::MetricsCollector;
pub use neighbor::{CommandSource, NeighborDiscovery, NeighborSource};
pub use scanner::{CycleReport, Scanner, start_scanner};
pub use store::{DeviceStore, MetricsStore};
pub use types::{BandwidthResult, Device, InterfaceStats};
