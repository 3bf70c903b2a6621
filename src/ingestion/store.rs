//! Transaction store client
//!
//! The remote store answers two questions: "recent signatures for this
//! address" and "full transaction for this signature". It is treated as an
//! unreliable, rate-limited, eventually-consistent oracle: every failure
//! comes back as a tagged `RpcError` and "not indexed yet" is `Ok(None)`.

use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::ingestion::RateLimiter;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One entry of a `getSignaturesForAddress` response (newest first)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<Value>,
}

impl SignatureInfo {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            slot: 0,
            block_time: None,
            err: None,
        }
    }

    /// Whether the transaction failed on-chain
    pub fn is_failed(&self) -> bool {
        self.err.as_ref().map(|e| !e.is_null()).unwrap_or(false)
    }
}

/// Read-only access to transaction history
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Up to `limit` most recent signatures for `address`, newest first
    async fn get_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError>;

    /// Full jsonParsed transaction, `None` when not (yet) available
    async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, RpcError>;

    /// Cheap reachability check run once before ingestion starts
    async fn health_check(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

/// JSON-RPC 2.0 client over HTTP
pub struct HttpRpcClient {
    client: Client,
    url: String,
    commitment: String,
    timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
    request_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(
        url: impl Into<String>,
        commitment: impl Into<String>,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Http(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            commitment: commitment.into(),
            timeout,
            rate_limiter,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self, RpcError> {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_second, 1));
        Self::new(
            config.http_url.clone(),
            config.commitment.clone(),
            config.request_timeout(),
            rate_limiter,
        )
    }

    /// Issue one JSON-RPC call and return its `result` member
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.rate_limiter.acquire().await;

        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            return Err(RpcError::JsonRpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout(self.timeout.as_millis() as u64)
        } else if e.is_decode() {
            RpcError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            RpcError::Status(status.as_u16())
        } else {
            RpcError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl TransactionStore for HttpRpcClient {
    async fn get_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let result = self
            .call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit, "commitment": self.commitment }]),
            )
            .await?;

        serde_json::from_value(result).map_err(|e| RpcError::Decode(e.to_string()))
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, RpcError> {
        let result = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "commitment": self.commitment,
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    async fn health_check(&self) -> Result<(), RpcError> {
        self.call("getSlot", json!([{ "commitment": self.commitment }]))
            .await
            .map(|_| ())
    }
}
