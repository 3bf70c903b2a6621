//! Redundancy Scout Library
//!
//! Watches a set of Solana wallets, turns their transactions into trade
//! events and flags coordinated buying or selling across wallets.
//! This library exposes core modules for the binary and for testing.

pub mod config;
pub mod constants;
pub mod correlation;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod telemetry;
pub mod watchlist;

// Re-export commonly used types
pub use config::{AppConfig, CorrelationConfig, ScoringWeights, TransportKind};
pub use correlation::{
    ChannelSignalSink, CorrelationEngine, CorrelationSink, LoggingSignalSink, SignalSink,
};
pub use error::{AppError, AppResult, RpcError};
pub use ingestion::{
    ConnectionState, EventSink, HttpRpcClient, PollingConfig, PollingSource,
    SignatureDeduplicator, SubscriptionConfig, SubscriptionSource, TradeSource, TransactionStore,
};
pub use metrics::Metrics;
pub use models::{Direction, TradeEvent, TradeSignal, WatchedAddress};
pub use watchlist::{SqliteWatchlist, StaticWatchlist, WatchlistProvider};
