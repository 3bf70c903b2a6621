//! Sliding-window correlation engine
//!
//! Events are bucketed by `(asset, direction)`. Every call purges all
//! buckets relative to the newest known time (bounded by the allowed clock
//! skew), then evaluates the touched bucket:
//! - distinct addresses below `min_addresses`: nothing
//! - otherwise confidence = address score + timing score + consistency score
//! - confidence below `min_confidence`: nothing, else a signal

use crate::config::{CorrelationConfig, ScoringWeights};
use crate::constants::MAX_WINDOW_SECS;
use crate::correlation::SignalSink;
use crate::metrics::Metrics;
use crate::models::{Direction, TradeEvent, TradeSignal};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

type BucketKey = (String, Direction);

/// Sliding-window aggregator shared by both ingestion transports
pub struct CorrelationEngine {
    config: CorrelationConfig,
    window: Duration,
    max_skew: Duration,
    buckets: Mutex<HashMap<BucketKey, Vec<TradeEvent>>>,
    sink: Option<Arc<dyn SignalSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig) -> Self {
        info!(
            window_seconds = config.window_seconds,
            min_addresses = config.min_addresses,
            min_confidence = config.min_confidence,
            "Correlation engine initialized"
        );
        let window_secs = config.window_seconds.min(MAX_WINDOW_SECS);
        Self {
            window: Duration::seconds(window_secs as i64),
            max_skew: Duration::seconds(config.max_clock_skew_secs.min(window_secs) as i64),
            config,
            buckets: Mutex::new(HashMap::new()),
            sink: None,
            metrics: None,
        }
    }

    /// Register the callback invoked with every emitted signal
    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Add `event` and evaluate its bucket against the wall clock
    pub fn process(&self, event: TradeEvent) -> Option<TradeSignal> {
        self.process_at(event, Utc::now())
    }

    /// Add `event` and evaluate its bucket with an explicit clock.
    ///
    /// The purge reference is the later of `now` and the event's own
    /// `observed_at`, capped at `now + max_clock_skew_secs`. Events stamped
    /// more than a full window ahead of `now` are dropped.
    pub fn process_at(&self, event: TradeEvent, now: DateTime<Utc>) -> Option<TradeSignal> {
        if event.observed_at > now + self.window {
            warn!(
                address = %event.address,
                token = %event.asset_id,
                signature = %event.raw_reference,
                ahead_secs = (event.observed_at - now).num_seconds(),
                "Event time too far ahead of the clock, dropping"
            );
            if let Some(metrics) = &self.metrics {
                metrics.dropped("future_timestamp");
            }
            return None;
        }

        let reference = now.max(event.observed_at.min(now + self.max_skew));
        let key: BucketKey = (event.asset_id.clone(), event.direction);

        let signal = {
            let mut buckets = self.buckets.lock();
            buckets.entry(key.clone()).or_default().push(event);
            self.purge(&mut buckets, reference);
            self.set_bucket_gauge(buckets.len());

            buckets
                .get(&key)
                .and_then(|events| self.evaluate(&key, events))
        };

        // Sink runs outside the lock
        if let Some(signal) = &signal {
            if let Some(metrics) = &self.metrics {
                metrics.signals_total.inc();
            }
            if let Some(sink) = &self.sink {
                sink.on_signal(signal);
            }
        }

        signal
    }

    /// Re-evaluate every live bucket at the current time
    pub fn active_patterns(&self) -> Vec<TradeSignal> {
        self.active_patterns_at(Utc::now())
    }

    pub fn active_patterns_at(&self, now: DateTime<Utc>) -> Vec<TradeSignal> {
        let mut buckets = self.buckets.lock();
        self.purge(&mut buckets, now);
        self.set_bucket_gauge(buckets.len());

        let mut patterns: Vec<TradeSignal> = buckets
            .iter()
            .filter_map(|(key, events)| self.evaluate(key, events))
            .collect();
        patterns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        patterns
    }

    /// Drop all buckets
    pub fn reset(&self) {
        self.buckets.lock().clear();
        self.set_bucket_gauge(0);
        info!("Correlation history cleared");
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Remove events outside the window and buckets left empty
    fn purge(&self, buckets: &mut HashMap<BucketKey, Vec<TradeEvent>>, reference: DateTime<Utc>) {
        let cutoff = reference - self.window;
        buckets.retain(|_, events| {
            events.retain(|e| e.observed_at > cutoff);
            !events.is_empty()
        });
    }

    fn evaluate(&self, key: &BucketKey, events: &[TradeEvent]) -> Option<TradeSignal> {
        let mut seen = HashSet::new();
        let wallets: Vec<String> = events
            .iter()
            .filter(|e| seen.insert(e.address.as_str()))
            .map(|e| e.address.clone())
            .collect();

        if wallets.len() < self.config.min_addresses {
            return None;
        }

        let amounts: Vec<f64> = events.iter().map(|e| e.quantity).collect();
        let total_amount: f64 = amounts.iter().sum();
        let avg_amount = total_amount / amounts.len() as f64;

        let first = events.iter().map(|e| e.observed_at).min()?;
        let last = events.iter().map(|e| e.observed_at).max()?;
        let span = (last - first).num_milliseconds() as f64 / 1000.0;

        let confidence = confidence(&self.config.weights, wallets.len(), span, &amounts);
        if confidence < self.config.min_confidence {
            debug!(
                token = %key.0,
                direction = %key.1,
                wallet_count = wallets.len(),
                confidence,
                "Pattern below confidence threshold"
            );
            return None;
        }

        Some(TradeSignal {
            token: key.0.clone(),
            side: key.1,
            wallet_count: wallets.len(),
            wallets,
            trade_count: events.len(),
            total_amount,
            avg_amount,
            first_trade_time: first,
            last_trade_time: last,
            time_span_seconds: span,
            confidence,
        })
    }

    fn set_bucket_gauge(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.active_buckets.set(count as i64);
        }
    }
}

/// Confidence in [0, 1] as the sum of three individually capped scores
///
/// # Arguments
/// * `weights` - Coefficients
/// * `wallet_count` - Distinct addresses in the bucket
/// * `span_secs` - Seconds between first and last event
/// * `amounts` - Quantities of all contributing events
pub fn confidence(
    weights: &ScoringWeights,
    wallet_count: usize,
    span_secs: f64,
    amounts: &[f64],
) -> f64 {
    let address_score = (wallet_count as f64 * weights.per_address).min(weights.address_cap);

    let timing_score = if span_secs < weights.tight_span_secs {
        weights.tight_score
    } else if span_secs < weights.medium_span_secs {
        weights.medium_score
    } else {
        weights.loose_score
    };

    let mean = if amounts.is_empty() {
        0.0
    } else {
        amounts.iter().sum::<f64>() / amounts.len() as f64
    };

    let consistency_score = if mean > 0.0 {
        let deviation =
            amounts.iter().map(|a| (a - mean).abs() / mean).sum::<f64>() / amounts.len() as f64;
        (weights.consistency_max - weights.consistency_max * deviation).max(0.0)
    } else {
        weights.consistency_fallback
    };

    (address_score + timing_score + consistency_score).clamp(0.0, 1.0)
}
