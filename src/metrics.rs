//! Prometheus metrics for Redundancy Scout
//!
//! Exposes metrics endpoint for monitoring:
//! - Ingested events by transport
//! - Emitted signals
//! - RPC failures by stage
//! - Subscription reconnects
//! - Dropped records by reason
//! - Live correlation buckets and watched addresses

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics state
pub struct Metrics {
    /// Prometheus registry
    registry: Registry,
    /// Trade events handed to the correlation engine, by source tag
    pub events_total: IntCounterVec,
    /// Signals emitted by the correlation engine
    pub signals_total: IntCounter,
    /// Failed or timed-out store requests, by stage
    pub rpc_errors_total: IntCounterVec,
    /// Subscription reconnect attempts
    pub reconnects_total: IntCounter,
    /// Records discarded before extraction, by reason
    pub dropped_records_total: IntCounterVec,
    /// Live (asset, direction) buckets
    pub active_buckets: IntGauge,
    /// Size of the last watch-list handed to a transport
    pub watched_addresses: IntGauge,
}

impl Metrics {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("scout_events_total", "Trade events ingested"),
            &["source"],
        )
        .expect("Failed to create events_total counter");
        registry
            .register(Box::new(events_total.clone()))
            .expect("Failed to register events_total");

        let signals_total = IntCounter::with_opts(Opts::new(
            "scout_signals_total",
            "Coordination signals emitted",
        ))
        .expect("Failed to create signals_total counter");
        registry
            .register(Box::new(signals_total.clone()))
            .expect("Failed to register signals_total");

        let rpc_errors_total = IntCounterVec::new(
            Opts::new("scout_rpc_errors_total", "Transaction store failures"),
            &["stage"],
        )
        .expect("Failed to create rpc_errors_total counter");
        registry
            .register(Box::new(rpc_errors_total.clone()))
            .expect("Failed to register rpc_errors_total");

        let reconnects_total = IntCounter::with_opts(Opts::new(
            "scout_reconnects_total",
            "Subscription socket reconnect attempts",
        ))
        .expect("Failed to create reconnects_total counter");
        registry
            .register(Box::new(reconnects_total.clone()))
            .expect("Failed to register reconnects_total");

        let dropped_records_total = IntCounterVec::new(
            Opts::new("scout_dropped_records_total", "Records dropped before extraction"),
            &["reason"],
        )
        .expect("Failed to create dropped_records_total counter");
        registry
            .register(Box::new(dropped_records_total.clone()))
            .expect("Failed to register dropped_records_total");

        let active_buckets = IntGauge::with_opts(Opts::new(
            "scout_active_buckets",
            "Live correlation buckets",
        ))
        .expect("Failed to create active_buckets gauge");
        registry
            .register(Box::new(active_buckets.clone()))
            .expect("Failed to register active_buckets");

        let watched_addresses = IntGauge::with_opts(Opts::new(
            "scout_watched_addresses",
            "Addresses in the current watch-list",
        ))
        .expect("Failed to create watched_addresses gauge");
        registry
            .register(Box::new(watched_addresses.clone()))
            .expect("Failed to register watched_addresses");

        Self {
            registry,
            events_total,
            signals_total,
            rpc_errors_total,
            reconnects_total,
            dropped_records_total,
            active_buckets,
            watched_addresses,
        }
    }

    pub fn rpc_error(&self, stage: &str) {
        self.rpc_errors_total.with_label_values(&[stage]).inc();
    }

    pub fn dropped(&self, reason: &str) {
        self.dropped_records_total.with_label_values(&[reason]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics handler - returns Prometheus metrics in text format
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<Metrics>>) -> impl IntoResponse {
    match state.render() {
        Ok(buffer) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /health
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Create metrics router
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}
