//! Periodic neighbor scan with bounded-concurrency latency probing
//!
//! One scan cycle: discover neighbors, probe every device through an
//! admission gate, wait for all probes, publish the whole device list to the
//! [`DeviceStore`] in one write, then evict stale devices. Readers never see
//! a partially probed cycle.

use crate::config::ScannerConfig;
use crate::error::Result;
use crate::latency::LatencyProbe;
use crate::metrics::MetricsCollector;
use crate::neighbor::NeighborDiscovery;
use crate::store::DeviceStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Default admission gate size
pub const MAX_CONCURRENT_PROBES: usize = 16;

/// Default eviction window for devices that stopped answering ARP/NDP
pub const STALE_DEVICE_RETENTION: Duration = Duration::from_secs(3600);

/// Outcome of one completed scan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Devices returned by discovery
    pub discovered: usize,
    /// Devices with a latency value after probing
    pub reachable: usize,
    /// Stale devices removed after publishing
    pub evicted: usize,
}

/// Scan scheduler
pub struct Scanner {
    discovery: NeighborDiscovery,
    prober: Arc<dyn LatencyProbe>,
    store: Arc<DeviceStore>,
    metrics: MetricsCollector,
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(
        discovery: NeighborDiscovery,
        prober: Arc<dyn LatencyProbe>,
        store: Arc<DeviceStore>,
        metrics: MetricsCollector,
        config: ScannerConfig,
    ) -> Self {
        Self {
            discovery,
            prober,
            store,
            metrics,
            config,
        }
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    /// Run one scan cycle.
    ///
    /// A discovery failure aborts the cycle before any store mutation. Probe
    /// failures only leave the affected device without a latency value.
    #[instrument(skip(self))]
    pub async fn scan_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();

        let mut devices = match self.discovery.discover().await {
            Ok(devices) => devices,
            Err(e) => {
                self.metrics.record_scan_failure();
                return Err(e);
            }
        };

        let gate = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let timeout = self.config.probe_timeout();
        let mut probes = JoinSet::new();

        for (index, device) in devices.iter().enumerate() {
            // Blocks the spawning loop while the gate is full
            let permit = match gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "Probe admission gate closed, probing stopped early");
                    break;
                }
            };

            let prober = self.prober.clone();
            let metrics = self.metrics.clone();
            let ip = device.ip;
            probes.spawn(async move {
                let _permit = permit;
                metrics.probe_started();
                let latency = match prober.probe(ip, timeout).await {
                    Ok(ms) => Some(ms),
                    Err(e) if e.is_probe_failure() => {
                        trace!(%ip, error = %e, "Probe failed");
                        None
                    }
                    Err(e) => {
                        warn!(%ip, error = %e, "Probe failed unexpectedly");
                        None
                    }
                };
                metrics.probe_finished(latency);
                (index, latency)
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, latency)) => devices[index].latency_ms = latency,
                Err(e) => warn!(error = %e, "Probe task did not complete"),
            }
        }

        self.store.update_devices(&devices);

        let evicted = self.store.cleanup_stale_devices(self.config.retention());
        if evicted > 0 {
            info!(count = evicted, "Removed stale devices");
            self.metrics.record_evicted(evicted);
        }

        let report = CycleReport {
            discovered: devices.len(),
            reachable: devices.iter().filter(|d| d.latency_ms.is_some()).count(),
            evicted,
        };

        let elapsed = started.elapsed();
        self.metrics
            .record_scan_cycle(elapsed.as_secs_f64(), self.store.len());
        debug!(
            discovered = report.discovered,
            reachable = report.reachable,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scan cycle complete"
        );

        Ok(report)
    }

    /// Scan immediately, then once per interval, until `cancel` fires.
    ///
    /// Cancellation also abandons an in-flight cycle; its probes are aborted
    /// and nothing from it is published.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        // tokio panics on a zero period
        let period = self.config.interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = period.as_secs(),
            max_concurrent_probes = self.config.max_concurrent_probes,
            "Scanner started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.scan_cycle() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Scan cycle skipped");
                    }
                }
            }
        }

        info!("Scanner stopped");
    }
}

/// Spawn the scanner loop in the background.
pub fn start_scanner(scanner: Arc<Scanner>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(scanner.run(cancel))
}
