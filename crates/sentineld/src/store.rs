//! Concurrency-safe state holders read by the HTTP layer
//!
//! Both stores use a reader/writer lock held only for the map operation;
//! no lock is ever held across network I/O.

use crate::types::{Device, InterfaceStats};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Discovered devices keyed by canonical MAC
#[derive(Debug, Default)]
pub struct DeviceStore {
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert every device by MAC, replacing the previous record wholesale.
    ///
    /// All devices of one call become visible to readers at once.
    pub fn update_devices(&self, devices: &[Device]) {
        let mut map = self.devices.write();
        for device in devices {
            map.insert(device.mac.clone(), device.clone());
        }
    }

    /// Devices seen within `window` of now, as an owned snapshot.
    pub fn get_active_devices(&self, window: Duration) -> Vec<Device> {
        self.get_active_devices_at(window, Utc::now())
    }

    /// Devices whose `last_seen` is strictly after `now - window`.
    ///
    /// Sorted by IP address, then MAC.
    pub fn get_active_devices_at(&self, window: Duration, now: DateTime<Utc>) -> Vec<Device> {
        let cutoff = cutoff(now, window);
        let mut active: Vec<Device> = self
            .devices
            .read()
            .values()
            .filter(|d| d.last_seen > cutoff)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.ip.cmp(&b.ip).then_with(|| a.mac.cmp(&b.mac)));
        active
    }

    /// Remove devices not seen within `max_age`; returns the number removed.
    pub fn cleanup_stale_devices(&self, max_age: Duration) -> usize {
        self.cleanup_stale_devices_at(max_age, Utc::now())
    }

    /// Remove devices whose `last_seen` is strictly before `now - max_age`.
    pub fn cleanup_stale_devices_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, max_age);
        let mut map = self.devices.write();
        let before = map.len();
        map.retain(|_, d| d.last_seen >= cutoff);
        before - map.len()
    }

    /// Number of devices currently held (active or not)
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

/// `now - age`, saturating at the earliest representable time
fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Single-slot holder for the last bandwidth sample
#[derive(Debug, Default)]
pub struct MetricsStore {
    last: RwLock<Option<InterfaceStats>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_stats(&self, stats: InterfaceStats) {
        *self.last.write() = Some(stats);
    }

    pub fn get_last_stats(&self) -> Option<InterfaceStats> {
        self.last.read().clone()
    }

    /// Store `stats` and return the sample it replaced, under one write lock.
    pub fn replace_last_stats(&self, stats: InterfaceStats) -> Option<InterfaceStats> {
        self.last.write().replace(stats)
    }
}
