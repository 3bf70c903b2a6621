//! Correlation Engine Unit Tests
//!
//! Behavioural properties of the sliding window:
//! - N distinct wallets inside the window give wallet_count == N
//! - Events older than the window relative to the newest are excluded
//! - Custom weights change the outcome

use chrono::{DateTime, Duration, Utc};
use redundancy_scout::{CorrelationConfig, CorrelationEngine, Direction, ScoringWeights, TradeEvent};

fn buy(address: &str, token: &str, qty: f64, at: DateTime<Utc>) -> TradeEvent {
    TradeEvent::new(address, token, Direction::Buy, qty, "test", at, format!("sig-{}", address))
}

#[test]
fn test_wallet_count_matches_distinct_wallets() {
    for n in 2..=6usize {
        let engine = CorrelationEngine::new(CorrelationConfig::default());
        let t0 = Utc::now();

        let mut last = None;
        for i in 0..n {
            let at = t0 + Duration::seconds(i as i64);
            last = engine.process_at(buy(&format!("W{}", i), "TK", 10.0, at), at);
        }

        let signal = last.expect("signal for n wallets");
        assert_eq!(signal.wallet_count, n);
        assert!(signal.confidence >= 0.5 && signal.confidence <= 1.0);
    }
}

#[test]
fn test_repeat_trades_count_once_per_wallet() {
    let engine = CorrelationEngine::new(CorrelationConfig::default());
    let t0 = Utc::now();

    engine.process_at(buy("A", "TK", 5.0, t0), t0);
    engine.process_at(buy("A", "TK", 5.0, t0), t0);
    let signal = engine.process_at(buy("B", "TK", 5.0, t0), t0).unwrap();

    assert_eq!(signal.wallet_count, 2);
    assert_eq!(signal.trade_count, 3);
    assert_eq!(signal.wallets, vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_old_event_excluded_relative_to_newest() {
    let engine = CorrelationEngine::new(CorrelationConfig::default());
    let t0 = Utc::now() - Duration::seconds(120);

    engine.process_at(buy("A", "TK", 5.0, t0), t0);
    engine.process_at(buy("B", "TK", 5.0, t0 + Duration::seconds(10)), t0 + Duration::seconds(10));

    // C arrives 35s after A and 25s after B: A drops out, B stays
    let t2 = t0 + Duration::seconds(35);
    let signal = engine.process_at(buy("C", "TK", 5.0, t2), t2).unwrap();
    assert_eq!(signal.wallet_count, 2);
    assert!(!signal.wallets.contains(&"A".to_string()));
}

#[test]
fn test_custom_weights_and_threshold() {
    let config = CorrelationConfig {
        window_seconds: 60,
        min_addresses: 3,
        min_confidence: 0.8,
        max_clock_skew_secs: 5,
        weights: ScoringWeights {
            per_address: 0.2,
            address_cap: 0.6,
            ..ScoringWeights::default()
        },
    };
    let engine = CorrelationEngine::new(config);
    let t0 = Utc::now();

    assert!(engine.process_at(buy("A", "TK", 1.0, t0), t0).is_none());
    assert!(engine.process_at(buy("B", "TK", 1.0, t0), t0).is_none());

    // 3 * 0.2 + 0.3 + 0.2 = 1.1, clamped to 1.0
    let signal = engine.process_at(buy("C", "TK", 1.0, t0), t0).unwrap();
    assert!((signal.confidence - 1.0).abs() < 1e-9);
}

#[test]
fn test_event_handoff_from_threads() {
    let engine = std::sync::Arc::new(CorrelationEngine::new(CorrelationConfig::default()));
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine.process_at(buy(&format!("W{}", i), &format!("TK{}", i % 2), 1.0, now), now);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.bucket_count(), 2);
    assert_eq!(engine.active_patterns_at(now).len(), 2);
}
