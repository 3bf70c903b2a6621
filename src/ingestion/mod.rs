//! Ingestion layer
//!
//! Discovers new transactions for the watched address set and normalizes
//! them into `TradeEvent`s. Two transports share one extractor and one
//! deduplicator:
//! - `PollingSource`: periodic getSignaturesForAddress + getTransaction
//! - `SubscriptionSource`: logsSubscribe over a WebSocket with reconnect

pub mod backoff;
pub mod dedupe;
pub mod extractor;
pub mod polling;
pub mod rate_limiter;
pub mod store;
pub mod subscription;

pub use backoff::Backoff;
pub use dedupe::SignatureDeduplicator;
pub use extractor::{account_keys, extract_trade};
pub use polling::{PollingConfig, PollingSource};
pub use rate_limiter::RateLimiter;
pub use store::{HttpRpcClient, SignatureInfo, TransactionStore};
pub use subscription::{ConnectionState, SubscriptionConfig, SubscriptionSource};

use crate::error::AppResult;
use crate::models::TradeEvent;
use async_trait::async_trait;

/// Receives every normalized event produced by an ingestion transport.
///
/// Called from the transport's own task; implementations must not block.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: TradeEvent);
}

impl<F> EventSink for F
where
    F: Fn(TradeEvent) + Send + Sync,
{
    fn on_event(&self, event: TradeEvent) {
        self(event)
    }
}

/// Common capability of both ingestion transports
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run until `stop` is called.
    ///
    /// Returns `Ok(())` after a stop request and an error only for setup
    /// problems: an empty watch-list, or an endpoint that is unreachable
    /// before the first successful connection. Later failures are retried.
    async fn start(&self) -> AppResult<()>;

    /// Request a cooperative stop. Safe to call more than once.
    fn stop(&self);
}
