//! Primary interface bandwidth sampling
//!
//! The primary interface is re-selected on every sample: among interfaces not
//! matching an ignored name prefix, the one with the highest received + sent
//! byte total wins. Rates are derived from two successive samples.

use crate::error::{Result, SentinelError};
use crate::metrics::MetricsCollector;
use crate::store::MetricsStore;
use crate::types::{BandwidthResult, InterfaceStats};
use chrono::Utc;
use std::sync::Arc;
use sysinfo::Networks;
use tracing::{debug, info, instrument};

/// Interface name prefixes skipped by default: loopback, Apple link-local
/// radios, VPN tunnels and VM/container bridges.
pub const DEFAULT_IGNORED_PREFIXES: [&str; 6] = ["lo", "lo0", "awdl0", "llw0", "utun", "bridge"];

/// Raw counters of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounter {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl InterfaceCounter {
    fn total(&self) -> u128 {
        u128::from(self.rx_bytes) + u128::from(self.tx_bytes)
    }
}

/// Per-interface byte counter query
pub trait CounterSource: Send + Sync {
    fn read_counters(&self) -> Result<Vec<InterfaceCounter>>;
}

/// Counters from the host OS via `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCounters;

impl CounterSource for SystemCounters {
    fn read_counters(&self) -> Result<Vec<InterfaceCounter>> {
        let networks = Networks::new_with_refreshed_list();
        Ok(networks
            .list()
            .iter()
            .map(|(name, data)| InterfaceCounter {
                name: name.clone(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .collect())
    }
}

/// Reads counters and picks the primary interface
pub struct BandwidthSampler {
    source: Box<dyn CounterSource>,
    ignored_prefixes: Vec<String>,
}

impl BandwidthSampler {
    pub fn new(source: Box<dyn CounterSource>, ignored_prefixes: Vec<String>) -> Self {
        Self {
            source,
            ignored_prefixes,
        }
    }

    /// Sampler over the host counters with the default ignore list
    pub fn system() -> Self {
        Self::new(
            Box::new(SystemCounters),
            DEFAULT_IGNORED_PREFIXES.iter().map(|p| p.to_string()).collect(),
        )
    }

    /// Case-sensitive prefix match against the ignore list
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Pick the eligible interface with the most total traffic.
    ///
    /// Ties go to the lexicographically smallest name so the choice does not
    /// depend on the order the OS reports interfaces in.
    pub fn select_primary<'a>(
        &self,
        counters: &'a [InterfaceCounter],
    ) -> Option<&'a InterfaceCounter> {
        let mut eligible: Vec<&InterfaceCounter> = counters
            .iter()
            .filter(|c| !self.is_ignored(&c.name))
            .collect();
        eligible.sort_by(|a, b| a.name.cmp(&b.name));

        eligible.into_iter().fold(None, |best, candidate| match best {
            Some(current) if current.total() >= candidate.total() => Some(current),
            _ => Some(candidate),
        })
    }

    /// Take one counter snapshot of the current primary interface.
    pub fn sample(&self) -> Result<InterfaceStats> {
        let counters = self.source.read_counters()?;
        let primary = self
            .select_primary(&counters)
            .ok_or(SentinelError::NoInterface)?;

        debug!(interface = %primary.name, "Detected primary interface");

        Ok(InterfaceStats {
            name: primary.name.clone(),
            rx_bytes: primary.rx_bytes,
            tx_bytes: primary.tx_bytes,
            timestamp: Utc::now(),
        })
    }
}

/// Receive and transmit rates in Mbps between two samples.
///
/// Returns `(0.0, 0.0)` when both samples carry the same timestamp. A counter
/// that went backwards yields a negative rate.
pub fn rate(old: &InterfaceStats, new: &InterfaceStats) -> (f64, f64) {
    let seconds = match (new.timestamp - old.timestamp).num_microseconds() {
        Some(0) => return (0.0, 0.0),
        Some(us) => us as f64 / 1_000_000.0,
        None => (new.timestamp - old.timestamp).num_seconds() as f64,
    };

    let to_mbps = |old_bytes: u64, new_bytes: u64| {
        let delta = i128::from(new_bytes) - i128::from(old_bytes);
        delta as f64 * 8.0 / seconds / 1_000_000.0
    };

    (
        to_mbps(old.rx_bytes, new.rx_bytes),
        to_mbps(old.tx_bytes, new.tx_bytes),
    )
}

/// On-demand bandwidth measurement backed by the single-slot metrics store
pub struct BandwidthMonitor {
    sampler: BandwidthSampler,
    store: Arc<MetricsStore>,
    metrics: Option<MetricsCollector>,
}

impl BandwidthMonitor {
    pub fn new(sampler: BandwidthSampler, store: Arc<MetricsStore>) -> Self {
        Self {
            sampler,
            store,
            metrics: None,
        }
    }

    /// Also export every sample through the Prometheus collector
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sample the primary interface and compute rates against the previous sample.
    ///
    /// Sampling errors propagate; the store keeps its previous sample in that case.
    #[instrument(skip(self))]
    pub fn sample_bandwidth(&self) -> Result<BandwidthResult> {
        let current = self.sampler.sample()?;
        let previous = self.store.replace_last_stats(current.clone());

        let (rx_mbps, tx_mbps, first_measurement) = match previous {
            Some(previous) => {
                let (rx, tx) = rate(&previous, &current);
                (rx, tx, false)
            }
            None => (0.0, 0.0, true),
        };

        info!(
            interface = %current.name,
            rx_mbps = format_args!("{:.2}", rx_mbps),
            tx_mbps = format_args!("{:.2}", tx_mbps),
            first_measurement,
            "Bandwidth sampled"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_bandwidth(rx_mbps, tx_mbps);
        }

        Ok(BandwidthResult {
            interface: current.name,
            rx_mbps,
            tx_mbps,
            timestamp: current.timestamp,
            first_measurement,
        })
    }

    /// The store holding the last sample
    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta};
    use parking_lot::Mutex;

    struct FixedCounters(Mutex<Result<Vec<InterfaceCounter>>>);

    impl FixedCounters {
        fn ok(counters: &[(&str, u64, u64)]) -> Self {
            Self(Mutex::new(Ok(counters
                .iter()
                .map(|(name, rx, tx)| InterfaceCounter {
                    name: name.to_string(),
                    rx_bytes: *rx,
                    tx_bytes: *tx,
                })
                .collect())))
        }
    }

    impl CounterSource for FixedCounters {
        fn read_counters(&self) -> Result<Vec<InterfaceCounter>> {
            match &*self.0.lock() {
                Ok(counters) => Ok(counters.clone()),
                Err(e) => Err(SentinelError::CounterRead(e.to_string())),
            }
        }
    }

    fn sampler(counters: &[(&str, u64, u64)]) -> BandwidthSampler {
        BandwidthSampler::new(
            Box::new(FixedCounters::ok(counters)),
            DEFAULT_IGNORED_PREFIXES.iter().map(|p| p.to_string()).collect(),
        )
    }

    fn stats(rx: u64, tx: u64, timestamp: DateTime<Utc>) -> InterfaceStats {
        InterfaceStats {
            name: "en0".into(),
            rx_bytes: rx,
            tx_bytes: tx,
            timestamp,
        }
    }

    #[test]
    fn test_rate_one_megabyte_per_second() {
        let t0 = Utc::now();
        let old = stats(5_000_000, 7_000_000, t0);
        let new = stats(6_000_000, 8_000_000, t0 + TimeDelta::seconds(1));
        assert_eq!(rate(&old, &new), (8.0, 8.0));
    }

    #[test]
    fn test_rate_same_timestamp_is_zero() {
        let t0 = Utc::now();
        let old = stats(0, 0, t0);
        let new = stats(9_999_999, 1, t0);
        assert_eq!(rate(&old, &new), (0.0, 0.0));
    }

    #[test]
    fn test_rate_counter_reset_goes_negative() {
        let t0 = Utc::now();
        let old = stats(2_000_000, 0, t0);
        let new = stats(1_000_000, 0, t0 + TimeDelta::seconds(1));
        let (rx, tx) = rate(&old, &new);
        assert_eq!(rx, -8.0);
        assert_eq!(tx, 0.0);
    }

    #[test]
    fn test_select_primary_highest_traffic() {
        let sampler = sampler(&[("en0", 100, 100), ("en1", 500, 10), ("lo0", 9_999, 9_999)]);
        let stats = sampler.sample().unwrap();
        assert_eq!(stats.name, "en1");
        assert_eq!(stats.rx_bytes, 500);
    }

    #[test]
    fn test_ignore_list_is_prefix_and_case_sensitive() {
        let sampler = sampler(&[]);
        assert!(sampler.is_ignored("lo"));
        assert!(sampler.is_ignored("utun3"));
        assert!(sampler.is_ignored("bridge100"));
        assert!(!sampler.is_ignored("en0"));
        assert!(!sampler.is_ignored("Bridge0"));
        assert!(!sampler.is_ignored("LO"));
    }

    #[test]
    fn test_select_primary_tie_breaks_on_name() {
        let sampler = sampler(&[("wlan0", 10, 10), ("eth0", 10, 10)]);
        assert_eq!(sampler.sample().unwrap().name, "eth0");
    }

    #[test]
    fn test_no_eligible_interface() {
        let sampler = sampler(&[("lo", 1, 1), ("utun0", 5, 5)]);
        assert!(matches!(sampler.sample(), Err(SentinelError::NoInterface)));

        let empty = sampler_with_error();
        assert!(matches!(empty.sample(), Err(SentinelError::CounterRead(_))));
    }

    fn sampler_with_error() -> BandwidthSampler {
        BandwidthSampler::new(
            Box::new(FixedCounters(Mutex::new(Err(SentinelError::CounterRead(
                "query failed".into(),
            ))))),
            Vec::new(),
        )
    }

    #[test]
    fn test_monitor_first_measurement_then_rates() {
        let store = Arc::new(MetricsStore::new());
        let monitor = BandwidthMonitor::new(sampler(&[("en0", 1_000, 2_000)]), store.clone());

        let first = monitor.sample_bandwidth().unwrap();
        assert!(first.first_measurement);
        assert_eq!((first.rx_mbps, first.tx_mbps), (0.0, 0.0));
        assert_eq!(first.interface, "en0");
        assert!(store.get_last_stats().is_some());

        let second = monitor.sample_bandwidth().unwrap();
        assert!(!second.first_measurement);
        // Counters did not move
        assert_eq!((second.rx_mbps, second.tx_mbps), (0.0, 0.0));
    }

    #[test]
    fn test_monitor_error_keeps_previous_sample() {
        let store = Arc::new(MetricsStore::new());
        let previous = stats(1, 1, Utc::now());
        store.set_last_stats(previous.clone());

        let monitor = BandwidthMonitor::new(sampler_with_error(), store.clone());
        assert!(monitor.sample_bandwidth().is_err());
        assert_eq!(store.get_last_stats(), Some(previous));
    }
}
