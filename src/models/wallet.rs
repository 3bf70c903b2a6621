use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// An account being watched for trading activity.
///
/// Handed to the ingestion layer per polling cycle (or per reconnect)
/// and never modified while that cycle runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedAddress {
    pub address: String,
    /// Free-form grouping label, e.g. "Top Trader"
    pub category: Option<String>,
    /// Reserved for weighted scoring
    pub weight: f64,
}

impl WatchedAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            category: None,
            weight: 1.0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Whether the address is a well-formed base58 public key
    pub fn is_valid_pubkey(&self) -> bool {
        Pubkey::from_str(&self.address).is_ok()
    }
}
