//! Error types for Redundancy Scout

use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error (bad values, empty watch-list in filtered mode)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source could not be loaded or deserialized
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transaction store (JSON-RPC) error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Subscription socket error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Watch-list provider error
    #[error("Watch-list error: {0}")]
    Watchlist(String),

    /// Explicit stop request
    #[error("Cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Cancellation unwinds a loop; everything else is retried
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

/// Tagged failure from the remote transaction store.
///
/// Every variant is transient from the ingestion loops' point of view:
/// the request is logged and skipped, never retried within the same cycle.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("http transport failed: {0}")]
    Http(String),

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("json-rpc error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
