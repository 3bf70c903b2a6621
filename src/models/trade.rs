//! Trade models - a normalized buy or sell observed for one watched address

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction from the watched address' point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Asset balance increased
    Buy,
    /// Asset balance decreased
    Sell,
}

impl Direction {
    /// Direction implied by the sign of an asset balance delta
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Buy
        } else {
            Direction::Sell
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// One detected balance change, produced once per transaction.
///
/// Immutable after construction; the correlation engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Watched address that traded
    pub address: String,
    /// Mint of the traded (non-currency) asset
    pub asset_id: String,
    pub direction: Direction,
    /// Absolute, decimal-adjusted quantity (always >= 0)
    pub quantity: f64,
    /// Which transport produced the event
    pub source_tag: String,
    /// Block time when known, otherwise time of detection
    pub observed_at: DateTime<Utc>,
    /// Transaction signature the event was derived from
    pub raw_reference: String,
}

impl TradeEvent {
    pub fn new(
        address: impl Into<String>,
        asset_id: impl Into<String>,
        direction: Direction,
        quantity: f64,
        source_tag: impl Into<String>,
        observed_at: DateTime<Utc>,
        raw_reference: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            asset_id: asset_id.into(),
            direction,
            quantity: quantity.abs(),
            source_tag: source_tag.into(),
            observed_at,
            raw_reference: raw_reference.into(),
        }
    }
}
