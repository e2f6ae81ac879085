//! Integration tests for sentineld
//!
//! Drives discovery, the scanner and the stores through the public API with
//! captured neighbor table output and fake probers. No raw sockets and no
//! external commands are used.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use sentineld::config::ScannerConfig;
    use sentineld::{
        Device, DeviceStore, LatencyProbe, MetricsCollector, NeighborDiscovery, NeighborSource,
        Result, Scanner, SentinelError,
    };
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ARP_TABLE: &str = "\
? (192.168.1.1) at 0:11:22:33:44:55 on en0 ifscope [ethernet]
? (192.168.1.42) at a4:83:e7:1:2:3 on en0 ifscope [ethernet]
? (192.168.1.50) at (incomplete) on en0 ifscope [ethernet]
? (192.168.1.255) at ff:ff:ff:ff:ff:ff on en0 ifscope [ethernet]";

    const NDP_TABLE: &str = "\
Neighbor                                Linklayer Address  Netif Expire    St Flgs Prbs
fe80::1%en0                             0:11:22:33:44:55   en0 23h59m58s S  R
fe80::aa:bbff:fecc:ddee%en0             2:aa:bb:cc:dd:ee   en0 permanent R
2001:db8::7                             2:aa:bb:cc:dd:ef   en0 23h59m58s S";

    /// Neighbor source returning captured output, swappable between cycles
    struct FixtureSource(Mutex<Result<String>>);

    impl FixtureSource {
        fn new(output: &str) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Ok(output.to_string()))))
        }

        fn set(&self, output: Result<String>) {
            *self.0.lock() = output;
        }
    }

    #[async_trait]
    impl NeighborSource for FixtureSource {
        async fn read_table(&self) -> Result<String> {
            match &*self.0.lock() {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(SentinelError::Discovery(e.to_string())),
            }
        }
    }

    /// Prober answering from a fixed latency table; unknown addresses time out
    #[derive(Default)]
    struct TableProber {
        latencies: Mutex<HashMap<IpAddr, u64>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl TableProber {
        fn with(entries: &[(&str, u64)]) -> Self {
            let prober = Self::default();
            prober.set(entries);
            prober
        }

        fn set(&self, entries: &[(&str, u64)]) {
            *self.latencies.lock() = entries
                .iter()
                .map(|(ip, ms)| (ip.parse().unwrap(), *ms))
                .collect();
        }
    }

    #[async_trait]
    impl LatencyProbe for TableProber {
        async fn probe(&self, ip: IpAddr, timeout: Duration) -> Result<u64> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if ip.is_ipv6() {
                return Err(SentinelError::UnsupportedAddress(ip));
            }
            self.latencies
                .lock()
                .get(&ip)
                .copied()
                .ok_or(SentinelError::Timeout { ip, timeout })
        }
    }

    fn scanner(
        arp: Arc<FixtureSource>,
        ndp: Arc<FixtureSource>,
        prober: Arc<TableProber>,
        store: Arc<DeviceStore>,
    ) -> Scanner {
        Scanner::new(
            NeighborDiscovery::new(arp, ndp),
            prober,
            store,
            MetricsCollector::new().unwrap(),
            ScannerConfig::default(),
        )
    }

    fn by_mac(devices: &[Device]) -> HashMap<String, Device> {
        devices.iter().map(|d| (d.mac.clone(), d.clone())).collect()
    }

    #[tokio::test]
    async fn test_scan_cycle_end_to_end() {
        let store = Arc::new(DeviceStore::new());
        let prober = Arc::new(TableProber::with(&[("192.168.1.1", 2)]));
        let scanner = scanner(
            FixtureSource::new(ARP_TABLE),
            FixtureSource::new(NDP_TABLE),
            prober,
            store.clone(),
        );

        let report = scanner.scan_cycle().await.unwrap();
        assert_eq!(report.discovered, 3);
        assert_eq!(report.reachable, 1);

        let devices = by_mac(&store.get_active_devices(Duration::from_secs(600)));
        assert_eq!(devices.len(), 3);

        // Same MAC in both tables: the ARP entry wins
        let router = &devices["00:11:22:33:44:55"];
        assert_eq!(router.ip.to_string(), "192.168.1.1");
        assert_eq!(router.latency_ms, Some(2));

        // Reachable by ARP but not answering probes
        assert_eq!(devices["a4:83:e7:01:02:03"].latency_ms, None);

        // Link-local NDP neighbor, IPv6 probes unsupported
        let v6 = &devices["02:aa:bb:cc:dd:ee"];
        assert_eq!(v6.ip.to_string(), "fe80::aa:bbff:fecc:ddee");
        assert_eq!(v6.latency_ms, None);

        // Global IPv6 neighbor is not collected
        assert!(!devices.contains_key("02:aa:bb:cc:dd:ef"));
    }

    #[tokio::test]
    async fn test_missing_ndp_table_is_tolerated() {
        let store = Arc::new(DeviceStore::new());
        let ndp = FixtureSource::new("");
        ndp.set(Err(SentinelError::Discovery("ndp: command not found".into())));

        let scanner = scanner(
            FixtureSource::new(ARP_TABLE),
            ndp,
            Arc::new(TableProber::default()),
            store.clone(),
        );

        let report = scanner.scan_cycle().await.unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_later_cycle_overwrites_and_keeps_absent_devices() {
        let store = Arc::new(DeviceStore::new());
        let arp = FixtureSource::new(ARP_TABLE);
        let prober = Arc::new(TableProber::with(&[("192.168.1.1", 2), ("192.168.1.42", 9)]));
        let scanner = scanner(arp.clone(), FixtureSource::new(""), prober.clone(), store.clone());

        scanner.scan_cycle().await.unwrap();
        let first = by_mac(&store.get_active_devices(Duration::from_secs(600)));
        assert_eq!(first["a4:83:e7:01:02:03"].latency_ms, Some(9));

        // Second cycle only sees the router, and the other device stops answering
        arp.set(Ok("? (192.168.1.1) at 0:11:22:33:44:55 on en0 ifscope [ethernet]".into()));
        prober.set(&[("192.168.1.1", 5)]);
        scanner.scan_cycle().await.unwrap();

        let second = by_mac(&store.get_active_devices(Duration::from_secs(600)));
        assert_eq!(second["00:11:22:33:44:55"].latency_ms, Some(5));
        assert!(second["00:11:22:33:44:55"].last_seen >= first["00:11:22:33:44:55"].last_seen);
        // Absent from the latest scan: previous record kept until eviction
        assert_eq!(second["a4:83:e7:01:02:03"], first["a4:83:e7:01:02:03"]);
    }

    #[tokio::test]
    async fn test_failed_discovery_leaves_store_untouched() {
        let store = Arc::new(DeviceStore::new());
        let arp = FixtureSource::new(ARP_TABLE);
        let scanner = scanner(
            arp.clone(),
            FixtureSource::new(""),
            Arc::new(TableProber::default()),
            store.clone(),
        );

        scanner.scan_cycle().await.unwrap();
        let before = store.get_active_devices(Duration::from_secs(600));

        arp.set(Err(SentinelError::Discovery("arp: permission denied".into())));
        let result = scanner.scan_cycle().await;
        assert!(matches!(result, Err(SentinelError::Discovery(_))));
        assert_eq!(store.get_active_devices(Duration::from_secs(600)), before);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_with_large_table() {
        let table: String = (1..=60)
            .map(|i| format!("? (10.1.0.{i}) at 02:00:00:00:01:{i:02x} on en0 ifscope [ethernet]\n"))
            .collect();
        let prober = Arc::new(TableProber {
            delay: Duration::from_millis(15),
            ..Default::default()
        });
        let store = Arc::new(DeviceStore::new());
        let scanner = scanner(
            FixtureSource::new(&table),
            FixtureSource::new(""),
            prober.clone(),
            store.clone(),
        );

        let report = scanner.scan_cycle().await.unwrap();
        assert_eq!(report.discovered, 60);
        assert_eq!(store.len(), 60);
        assert!(prober.peak.load(Ordering::SeqCst) <= 16);
        assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_store_full_overwrite_by_mac() {
        let store = DeviceStore::new();
        let now = Utc::now();
        let ip: IpAddr = "192.168.1.42".parse().unwrap();

        let mut first = Device::new(ip, "a4:83:e7:01:02:03", now - TimeDelta::seconds(5));
        first.latency_ms = Some(40);
        let mut second = Device::new(ip, "a4:83:e7:01:02:03", now);
        second.latency_ms = Some(3);

        store.update_devices(&[first]);
        store.update_devices(&[second.clone()]);

        let devices = store.get_active_devices(Duration::from_secs(60));
        assert_eq!(devices, vec![second]);
    }

    #[test]
    fn test_cleanup_twice_removes_nothing_second_time() {
        let store = DeviceStore::new();
        let now = Utc::now();
        store.update_devices(&[
            Device::new("10.0.0.1".parse().unwrap(), "02:00:00:00:00:01", now - TimeDelta::hours(2)),
            Device::new("10.0.0.2".parse().unwrap(), "02:00:00:00:00:02", now),
        ]);

        assert_eq!(store.cleanup_stale_devices(Duration::from_secs(3600)), 1);
        assert_eq!(store.cleanup_stale_devices(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }
}
