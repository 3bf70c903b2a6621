//! Signal models - coordinated activity found by the correlation engine

use super::Direction;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Summary of one sliding-window bucket at the moment it crossed the
/// address and confidence thresholds. Built fresh on every evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct TradeSignal {
    pub token: String,
    pub side: Direction,
    /// Distinct addresses in the bucket
    pub wallet_count: usize,
    /// Distinct addresses, in order of first appearance
    pub wallets: Vec<String>,
    /// Events contributing to the bucket (may exceed `wallet_count`)
    pub trade_count: usize,
    pub total_amount: f64,
    pub avg_amount: f64,
    pub first_trade_time: DateTime<Utc>,
    pub last_trade_time: DateTime<Utc>,
    /// Seconds between first and last contributing event
    pub time_span_seconds: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl std::fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short_token: String = self.token.chars().take(8).collect();
        write!(
            f,
            "{} {}... | {} wallets | avg {:.2} | span {:.1}s | confidence {:.0}%",
            self.side,
            short_token,
            self.wallet_count,
            self.avg_amount,
            self.time_span_seconds,
            self.confidence * 100.0
        )
    }
}
