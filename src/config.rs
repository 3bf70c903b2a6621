//! Configuration management for Redundancy Scout
//!
//! Loads configuration from TOML/YAML files and environment variables.
//! Environment variables override file values.

use crate::constants::MAX_WINDOW_SECS;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Transaction store endpoints
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Ingestion transport settings
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Correlation window and scoring
    #[serde(default)]
    pub correlation: CorrelationConfig,
    /// Watch-list source
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// RPC endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC HTTP endpoint
    #[serde(default = "default_http_url")]
    pub http_url: String,
    /// JSON-RPC WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Sliding-window rate limit (requests per second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,
    /// Cap on simultaneous outbound requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// How many recent signatures to request per address
    #[serde(default = "default_signature_limit")]
    pub signature_limit: usize,
    /// Commitment level for reads and subscriptions
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_http_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_ws_url() -> String {
    "wss://api.mainnet-beta.solana.com".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_rate_limit() -> u32 {
    40
}

fn default_max_concurrent() -> usize {
    8
}

fn default_signature_limit() -> usize {
    5
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
            request_timeout_ms: default_request_timeout(),
            rate_limit_per_second: default_rate_limit(),
            max_concurrent_requests: default_max_concurrent(),
            signature_limit: default_signature_limit(),
            commitment: default_commitment(),
        }
    }
}

/// Which ingestion transport to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP polling with signature deduplication
    #[default]
    Polling,
    /// Persistent WebSocket subscription
    Subscription,
}

/// Ingestion transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub transport: TransportKind,
    /// Seconds between polling cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Signature deduplicator capacity (LRU)
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
    /// First reconnect delay in milliseconds
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,
    /// Upper bound for the reconnect delay in milliseconds
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
    /// Double the reconnect delay after each failure (false = constant delay)
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    /// Subscribe to all activity instead of one subscription per address
    #[serde(default)]
    pub subscribe_all: bool,
    /// Extra attempts when a notified transaction is not indexed yet
    #[serde(default = "default_detail_retries")]
    pub detail_fetch_retries: u32,
    /// Delay between detail fetch attempts in milliseconds
    #[serde(default = "default_detail_retry_delay")]
    pub detail_fetch_retry_delay_ms: u64,
    /// Reconnect when the socket stays silent this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Give up waiting for subscription acknowledgments after this long
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_dedupe_capacity() -> usize {
    50_000
}

fn default_reconnect_base() -> u64 {
    3000
}

fn default_reconnect_max() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_detail_retries() -> u32 {
    2
}

fn default_detail_retry_delay() -> u64 {
    400
}

fn default_idle_timeout() -> u64 {
    45
}

fn default_ack_timeout() -> u64 {
    10
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            poll_interval_secs: default_poll_interval(),
            dedupe_capacity: default_dedupe_capacity(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_max_ms: default_reconnect_max(),
            exponential_backoff: true,
            subscribe_all: false,
            detail_fetch_retries: default_detail_retries(),
            detail_fetch_retry_delay_ms: default_detail_retry_delay(),
            idle_timeout_secs: default_idle_timeout(),
            ack_timeout_secs: default_ack_timeout(),
        }
    }
}

/// Sliding-window correlation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
    /// Trailing window over which events are correlated
    #[serde(default = "default_window")]
    pub window_seconds: u64,
    /// Minimum distinct addresses for a signal
    #[serde(default = "default_min_addresses")]
    pub min_addresses: usize,
    /// Minimum confidence for a signal
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// How far an event's block time may run ahead of the local clock
    /// before it stops advancing the purge reference
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_secs: u64,
    /// Confidence coefficients
    #[serde(default)]
    pub weights: ScoringWeights,
}

fn default_window() -> u64 {
    30
}

fn default_min_addresses() -> usize {
    2
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_max_clock_skew() -> u64 {
    5
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window(),
            min_addresses: default_min_addresses(),
            min_confidence: default_min_confidence(),
            max_clock_skew_secs: default_max_clock_skew(),
            weights: ScoringWeights::default(),
        }
    }
}

/// Hand-tuned confidence coefficients.
///
/// address score = min(count * per_address, address_cap)
/// timing score  = tight_score / medium_score / loose_score by span tier
/// consistency   = max(0, consistency_max - consistency_max * mean relative deviation)
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_per_address")]
    pub per_address: f64,
    #[serde(default = "default_address_cap")]
    pub address_cap: f64,
    #[serde(default = "default_tight_span")]
    pub tight_span_secs: f64,
    #[serde(default = "default_tight_score")]
    pub tight_score: f64,
    #[serde(default = "default_medium_span")]
    pub medium_span_secs: f64,
    #[serde(default = "default_medium_score")]
    pub medium_score: f64,
    #[serde(default = "default_loose_score")]
    pub loose_score: f64,
    #[serde(default = "default_consistency_max")]
    pub consistency_max: f64,
    /// Used when the mean amount is zero
    #[serde(default = "default_consistency_fallback")]
    pub consistency_fallback: f64,
}

fn default_per_address() -> f64 {
    0.1
}

fn default_address_cap() -> f64 {
    0.5
}

fn default_tight_span() -> f64 {
    5.0
}

fn default_tight_score() -> f64 {
    0.3
}

fn default_medium_span() -> f64 {
    15.0
}

fn default_medium_score() -> f64 {
    0.2
}

fn default_loose_score() -> f64 {
    0.1
}

fn default_consistency_max() -> f64 {
    0.2
}

fn default_consistency_fallback() -> f64 {
    0.1
}

impl ScoringWeights {
    /// Coefficients must be finite and non-negative, span tiers ascending
    pub fn validate(&self) -> Result<(), ConfigError> {
        let coefficients = [
            ("per_address", self.per_address),
            ("address_cap", self.address_cap),
            ("tight_span_secs", self.tight_span_secs),
            ("tight_score", self.tight_score),
            ("medium_span_secs", self.medium_span_secs),
            ("medium_score", self.medium_score),
            ("loose_score", self.loose_score),
            ("consistency_max", self.consistency_max),
            ("consistency_fallback", self.consistency_fallback),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Message(format!(
                    "correlation.weights.{} must be a finite non-negative number",
                    name
                )));
            }
        }

        if self.tight_span_secs >= self.medium_span_secs {
            return Err(ConfigError::Message(
                "correlation.weights.tight_span_secs must be below medium_span_secs".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            per_address: default_per_address(),
            address_cap: default_address_cap(),
            tight_span_secs: default_tight_span(),
            tight_score: default_tight_score(),
            medium_span_secs: default_medium_span(),
            medium_score: default_medium_score(),
            loose_score: default_loose_score(),
            consistency_max: default_consistency_max(),
            consistency_fallback: default_consistency_fallback(),
        }
    }
}

/// One statically configured address
#[derive(Debug, Clone, Deserialize)]
pub struct WatchedAddressConfig {
    pub address: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Watch-list source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    /// Static addresses (used when no database is configured)
    #[serde(default)]
    pub addresses: Vec<WatchedAddressConfig>,
    /// SQLite file holding the `watched_wallets` table
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Only load these categories (empty = all)
    #[serde(default)]
    pub categories: Vec<String>,
    /// Hard cap on watched addresses
    #[serde(default = "default_watch_limit")]
    pub limit: Option<u32>,
}

fn default_watch_limit() -> Option<u32> {
    Some(50)
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            database_path: None,
            categories: Vec::new(),
            limit: default_watch_limit(),
        }
    }
}

/// Prometheus / health endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest first):
    /// 1. `SCOUT_*` environment variables
    /// 2. `config/config.{toml,yaml}`
    /// 3. `config.{toml,yaml}`
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("rpc.http_url", default_http_url())?
            .set_default("rpc.ws_url", default_ws_url())?
            .set_default("ingestion.transport", "polling")?
            .set_default("correlation.window_seconds", default_window())?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // SCOUT_CORRELATION__WINDOW_SECONDS=45 -> correlation.window_seconds = 45
            .add_source(
                Environment::with_prefix("SCOUT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("watchlist.categories"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.correlation.window_seconds == 0
            || self.correlation.window_seconds > MAX_WINDOW_SECS
        {
            return Err(ConfigError::Message(format!(
                "correlation.window_seconds must be within 1..={}",
                MAX_WINDOW_SECS
            )));
        }

        if self.correlation.max_clock_skew_secs > self.correlation.window_seconds {
            return Err(ConfigError::Message(
                "correlation.max_clock_skew_secs must not exceed window_seconds".to_string(),
            ));
        }

        self.correlation.weights.validate()?;

        if self.correlation.min_addresses == 0 {
            return Err(ConfigError::Message(
                "correlation.min_addresses must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.correlation.min_confidence) {
            return Err(ConfigError::Message(
                "correlation.min_confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.ingestion.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "ingestion.poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.ingestion.dedupe_capacity == 0 {
            return Err(ConfigError::Message(
                "ingestion.dedupe_capacity must be greater than 0".to_string(),
            ));
        }

        if self.ingestion.reconnect_base_ms > self.ingestion.reconnect_max_ms {
            return Err(ConfigError::Message(
                "ingestion.reconnect_base_ms must not exceed reconnect_max_ms".to_string(),
            ));
        }

        if self.ingestion.idle_timeout_secs == 0 || self.ingestion.ack_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "ingestion.idle_timeout_secs and ack_timeout_secs must be greater than 0"
                    .to_string(),
            ));
        }

        if self.rpc.max_concurrent_requests == 0 {
            return Err(ConfigError::Message(
                "rpc.max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        match self.ingestion.transport {
            TransportKind::Polling if self.rpc.http_url.is_empty() => {
                return Err(ConfigError::Message("rpc.http_url must be set".to_string()));
            }
            TransportKind::Subscription if self.rpc.ws_url.is_empty() => {
                return Err(ConfigError::Message("rpc.ws_url must be set".to_string()));
            }
            _ => {}
        }

        Ok(())
    }
}
