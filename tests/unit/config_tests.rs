//! Configuration Unit Tests
//!
//! Deserializes TOML through the config crate the same way `AppConfig::load`
//! does, without touching the process environment.

use config::{Config, File, FileFormat};
use redundancy_scout::config::{AppConfig, LogFormat, TransportKind};
use redundancy_scout::ingestion::SubscriptionConfig;
use std::time::Duration;

fn parse(toml: &str) -> AppConfig {
    Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

#[test]
fn test_full_file() {
    let config = parse(
        r#"
        [rpc]
        http_url = "https://rpc.example.com"
        ws_url = "wss://rpc.example.com"
        max_concurrent_requests = 4

        [ingestion]
        transport = "subscription"
        exponential_backoff = false
        subscribe_all = true

        [correlation]
        window_seconds = 45
        min_addresses = 3

        [correlation.weights]
        tight_score = 0.4

        [[watchlist.addresses]]
        address = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU"
        category = "Top Trader"

        [logging]
        format = "json"
        "#,
    );

    assert!(config.validate().is_ok());
    assert_eq!(config.rpc.max_concurrent_requests, 4);
    assert_eq!(config.ingestion.transport, TransportKind::Subscription);
    assert!(!config.ingestion.exponential_backoff);
    assert!(config.ingestion.subscribe_all);
    assert_eq!(config.correlation.window_seconds, 45);
    assert!((config.correlation.weights.tight_score - 0.4).abs() < f64::EPSILON);
    assert!((config.correlation.weights.per_address - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.watchlist.addresses.len(), 1);
    assert!((config.watchlist.addresses[0].weight - 1.0).abs() < f64::EPSILON);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_empty_file_uses_defaults() {
    let config = parse("");
    assert!(config.validate().is_ok());
    assert_eq!(config.ingestion.poll_interval_secs, 2);
    assert_eq!(config.ingestion.reconnect_base_ms, 3000);
    assert_eq!(config.rpc.signature_limit, 5);
    assert_eq!(config.metrics.port, 9090);
}

#[test]
fn test_invalid_confidence_rejected() {
    let config = parse(
        r#"
        [correlation]
        min_confidence = 1.5
        "#,
    );
    assert!(config.validate().is_err());
}

#[test]
fn test_subscription_timeouts_from_file() {
    let config = parse(
        r#"
        [rpc]
        request_timeout_ms = 750
        max_concurrent_requests = 3

        [ingestion]
        idle_timeout_secs = 20
        ack_timeout_secs = 4
        "#,
    );
    assert!(config.validate().is_ok());

    let subscription = SubscriptionConfig::from_app(&config);
    assert_eq!(subscription.ack_timeout, Duration::from_secs(4));
    assert_eq!(subscription.idle_timeout, Duration::from_secs(20));
    assert_eq!(subscription.request_timeout, Duration::from_millis(750));
    assert_eq!(subscription.max_in_flight, 3);

    assert_eq!(parse("").ingestion.ack_timeout_secs, 10);
}

#[test]
fn test_inverted_timing_tiers_rejected() {
    let config = parse(
        r#"
        [correlation.weights]
        tight_span_secs = 20.0
        medium_span_secs = 15.0
        "#,
    );
    assert!(config.validate().is_err());
}
