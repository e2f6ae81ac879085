//! HTTP surface over the stores
//!
//! Thin JSON handlers; all state lives in the stores and the bandwidth monitor.

use crate::bandwidth::BandwidthMonitor;
use crate::error::{Result, SentinelError};
use crate::metrics::MetricsCollector;
use crate::store::DeviceStore;
use crate::types::{BandwidthResult, Device};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, SecondsFormat, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const BANNER: &str = "Sentinel - LAN bandwidth and device monitor";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<BandwidthMonitor>,
    pub devices: Arc<DeviceStore>,
    pub metrics: MetricsCollector,
    /// Window used by `/api/devices`
    pub active_window: Duration,
}

/// `/api/bandwidth` body
#[derive(Debug, Serialize)]
pub struct BandwidthResponse {
    pub interface: String,
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub timestamp: String,
    pub first_measurement: bool,
}

impl From<BandwidthResult> for BandwidthResponse {
    fn from(result: BandwidthResult) -> Self {
        Self {
            interface: result.interface,
            rx_mbps: result.rx_mbps,
            tx_mbps: result.tx_mbps,
            timestamp: rfc3339(result.timestamp),
            first_measurement: result.first_measurement,
        }
    }
}

/// One entry of `/api/devices`
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub ip: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub last_seen: String,
}

impl From<&Device> for DeviceResponse {
    fn from(device: &Device) -> Self {
        Self {
            ip: device.ip.to_string(),
            mac: device.mac.clone(),
            latency_ms: device.latency_ms,
            last_seen: rfc3339(device.last_seen),
        }
    }
}

/// `/api/devices` body
#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceResponse>,
    pub count: usize,
    pub updated: String,
}

fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/bandwidth", get(bandwidth_handler))
        .route("/api/devices", get(devices_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP API stopped");
    Ok(())
}

async fn root_handler() -> &'static str {
    BANNER
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Sample bandwidth on demand; a sampling error is a 500 with the error text.
async fn bandwidth_handler(State(state): State<AppState>) -> Response {
    let monitor = state.monitor.clone();
    let sampled = tokio::task::spawn_blocking(move || monitor.sample_bandwidth())
        .await
        .unwrap_or_else(|e| Err(SentinelError::CounterRead(format!("sampling task failed: {}", e))));

    match sampled {
        Ok(result) => Json(BandwidthResponse::from(result)).into_response(),
        Err(e) => {
            error!(error = %e, "Bandwidth sample failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn devices_handler(State(state): State<AppState>) -> Json<DevicesResponse> {
    let devices: Vec<DeviceResponse> = state
        .devices
        .get_active_devices(state.active_window)
        .iter()
        .map(DeviceResponse::from)
        .collect();
    debug!(count = devices.len(), "Serving active devices");

    Json(DevicesResponse {
        count: devices.len(),
        devices,
        updated: rfc3339(Utc::now()),
    })
}

/// Prometheus text format
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
