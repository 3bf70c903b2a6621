//! Metrics Endpoint Integration Tests

use redundancy_scout::metrics::{metrics_router, Metrics};
use std::sync::Arc;

async fn serve(metrics: Arc<Metrics>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, metrics_router(metrics)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_endpoint() {
    let base = serve(Arc::new(Metrics::new())).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let metrics = Arc::new(Metrics::new());
    metrics.signals_total.inc();
    metrics.reconnects_total.inc_by(3);
    metrics.watched_addresses.set(12);
    metrics.dropped("malformed_frame");

    let base = serve(metrics).await;
    let body = reqwest::get(format!("{}/metrics", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("scout_signals_total 1"));
    assert!(body.contains("scout_reconnects_total 3"));
    assert!(body.contains("scout_watched_addresses 12"));
    assert!(body.contains("scout_dropped_records_total{reason=\"malformed_frame\"} 1"));
}
