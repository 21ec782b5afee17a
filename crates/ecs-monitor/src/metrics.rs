//! Gauge sink and Prometheus exposition
//!
//! Reconcilers only see [`MetricsSink`]; the process wires in a
//! [`PrometheusSink`] bound to its own registry and serves it on
//! `GET /metrics`.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ecs_monitor_common::metrics::GAUGES;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Destination for labeled gauge updates
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

/// Gauges registered on an injected registry
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    gauges: HashMap<&'static str, GaugeVec>,
}

impl PrometheusSink {
    /// Register every known gauge on `registry`
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let mut gauges = HashMap::new();
        for (name, help, label_keys) in GAUGES {
            let gauge = GaugeVec::new(Opts::new(*name, *help), label_keys)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(*name, gauge);
        }
        Ok(Self { registry, gauges })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsSink for PrometheusSink {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let Some(gauge) = self.gauges.get(name) else {
            warn!(metric = name, "Unknown gauge");
            return;
        };
        let labels: HashMap<&str, &str> = labels.iter().copied().collect();
        match gauge.get_metric_with(&labels) {
            Ok(g) => g.set(value),
            Err(e) => warn!(metric = name, error = %e, "Failed to set gauge"),
        }
    }
}

/// Sink that keeps the last value per series in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    values: Arc<Mutex<BTreeMap<(String, Vec<(String, String)>), f64>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value written for this exact series
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&series_key(name, labels))
            .copied()
    }

    /// Every series of one gauge, as (labels, value)
    pub fn series(&self, name: &str) -> Vec<(Vec<(String, String)>, f64)> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|((_, labels), v)| (labels.clone(), *v))
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(series_key(name, labels), value);
    }
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> (String, Vec<(String, String)>) {
    let mut labels: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    labels.sort();
    (name.to_string(), labels)
}

/// Render the registry in Prometheus text format
pub fn export_metrics(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    match export_metrics(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")).into_response(),
    }
}

/// Router exposing `GET /metrics`
pub fn metrics_router(registry: Arc<Registry>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Bind the metrics listener. Failing here is fatal at startup.
pub async fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {addr}"))
}

/// Serve the registry until `cancel` fires
pub async fn serve(
    listener: tokio::net::TcpListener,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "Serving metrics");
    axum::serve(listener, metrics_router(registry))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("Metrics server failed")
}
