//! Prometheus metrics collection for sentineld
//!
//! Point-in-time counters and gauges only; nothing is persisted.

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector shared by the scanner, the bandwidth monitor and the HTTP layer
#[derive(Clone)]
pub struct MetricsCollector {
    // Counters
    pub scan_cycles_total: Counter,
    pub scan_failures_total: Counter,
    pub probes_total: Counter,
    pub probe_failures_total: Counter,
    pub devices_evicted_total: Counter,
    pub bandwidth_samples_total: Counter,

    // Gauges
    pub devices_known: Gauge,
    pub probes_in_flight: Gauge,
    pub rx_mbps: Gauge,
    pub tx_mbps: Gauge,

    // Histograms
    pub probe_latency_seconds: Histogram,
    pub scan_cycle_seconds: Histogram,

    // Registry for export
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let scan_cycles_total = Counter::with_opts(Opts::new(
            "sentinel_scan_cycles_total",
            "Total number of completed scan cycles",
        ))?;
        registry.register(Box::new(scan_cycles_total.clone()))?;

        let scan_failures_total = Counter::with_opts(Opts::new(
            "sentinel_scan_failures_total",
            "Total number of scan cycles skipped because discovery failed",
        ))?;
        registry.register(Box::new(scan_failures_total.clone()))?;

        let probes_total = Counter::with_opts(Opts::new(
            "sentinel_probes_total",
            "Total number of latency probes started",
        ))?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_failures_total = Counter::with_opts(Opts::new(
            "sentinel_probe_failures_total",
            "Total number of latency probes that failed or timed out",
        ))?;
        registry.register(Box::new(probe_failures_total.clone()))?;

        let devices_evicted_total = Counter::with_opts(Opts::new(
            "sentinel_devices_evicted_total",
            "Total number of stale devices removed from the store",
        ))?;
        registry.register(Box::new(devices_evicted_total.clone()))?;

        let bandwidth_samples_total = Counter::with_opts(Opts::new(
            "sentinel_bandwidth_samples_total",
            "Total number of bandwidth samples taken",
        ))?;
        registry.register(Box::new(bandwidth_samples_total.clone()))?;

        // Gauges
        let devices_known = Gauge::with_opts(Opts::new(
            "sentinel_devices_known",
            "Number of devices currently held in the device store",
        ))?;
        registry.register(Box::new(devices_known.clone()))?;

        let probes_in_flight = Gauge::with_opts(Opts::new(
            "sentinel_probes_in_flight",
            "Number of latency probes currently executing",
        ))?;
        registry.register(Box::new(probes_in_flight.clone()))?;

        let rx_mbps = Gauge::with_opts(Opts::new(
            "sentinel_rx_mbps",
            "Receive rate of the primary interface at the last sample",
        ))?;
        registry.register(Box::new(rx_mbps.clone()))?;

        let tx_mbps = Gauge::with_opts(Opts::new(
            "sentinel_tx_mbps",
            "Transmit rate of the primary interface at the last sample",
        ))?;
        registry.register(Box::new(tx_mbps.clone()))?;

        // Histograms
        let probe_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sentinel_probe_latency_seconds",
                "Round-trip time of successful latency probes in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0,
            ]),
        )?;
        registry.register(Box::new(probe_latency_seconds.clone()))?;

        let scan_cycle_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sentinel_scan_cycle_seconds",
                "Wall-clock duration of complete scan cycles in seconds",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(scan_cycle_seconds.clone()))?;

        Ok(Self {
            scan_cycles_total,
            scan_failures_total,
            probes_total,
            probe_failures_total,
            devices_evicted_total,
            bandwidth_samples_total,
            devices_known,
            probes_in_flight,
            rx_mbps,
            tx_mbps,
            probe_latency_seconds,
            scan_cycle_seconds,
            registry: Arc::new(registry),
        })
    }

    /// Record a completed scan cycle
    pub fn record_scan_cycle(&self, duration_secs: f64, devices_known: usize) {
        self.scan_cycles_total.inc();
        self.scan_cycle_seconds.observe(duration_secs);
        self.devices_known.set(devices_known as f64);
    }

    /// Record a cycle skipped because discovery failed
    pub fn record_scan_failure(&self) {
        self.scan_failures_total.inc();
    }

    /// Record a probe entering the admission gate
    pub fn probe_started(&self) {
        self.probes_total.inc();
        self.probes_in_flight.inc();
    }

    /// Record a probe leaving the gate; `latency_ms` is `None` on failure
    pub fn probe_finished(&self, latency_ms: Option<u64>) {
        self.probes_in_flight.dec();
        match latency_ms {
            Some(ms) => self.probe_latency_seconds.observe(ms as f64 / 1000.0),
            None => self.probe_failures_total.inc(),
        }
    }

    /// Record stale devices removed by cleanup
    pub fn record_evicted(&self, count: usize) {
        self.devices_evicted_total.inc_by(count as f64);
    }

    /// Record a bandwidth sample
    pub fn record_bandwidth(&self, rx_mbps: f64, tx_mbps: f64) {
        self.bandwidth_samples_total.inc();
        self.rx_mbps.set(rx_mbps);
        self.tx_mbps.set(tx_mbps);
    }
}
