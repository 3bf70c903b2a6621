//! Polling transport
//!
//! Every `interval`: list recent signatures for each watched address,
//! keep the ones the deduplicator has not seen, fetch their details and
//! run the extractor. Requests fan out concurrently behind a semaphore and
//! each one carries its own timeout, so one slow address never stalls the
//! rest of the cycle.

use crate::config::AppConfig;
use crate::constants::sources;
use crate::error::{AppError, AppResult, RpcError};
use crate::ingestion::{
    extract_trade, EventSink, SignatureDeduplicator, SignatureInfo, TradeSource, TransactionStore,
};
use crate::metrics::Metrics;
use crate::models::{TradeEvent, WatchedAddress};
use crate::watchlist::WatchlistProvider;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polling loop settings
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Timeout applied to every store request
    pub request_timeout: Duration,
    /// Signatures requested per address and cycle
    pub signature_limit: usize,
    /// Simultaneous outbound requests
    pub max_concurrent: usize,
}

impl PollingConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.ingestion.poll_interval_secs),
            request_timeout: config.rpc.request_timeout(),
            signature_limit: config.rpc.signature_limit,
            max_concurrent: config.rpc.max_concurrent_requests,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// HTTP polling ingestion loop
pub struct PollingSource {
    store: Arc<dyn TransactionStore>,
    watchlist: Arc<dyn WatchlistProvider>,
    dedupe: Arc<SignatureDeduplicator>,
    sink: Arc<dyn EventSink>,
    config: PollingConfig,
    permits: Semaphore,
    cancel: CancellationToken,
    metrics: Option<Arc<Metrics>>,
}

impl PollingSource {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        watchlist: Arc<dyn WatchlistProvider>,
        dedupe: Arc<SignatureDeduplicator>,
        sink: Arc<dyn EventSink>,
        config: PollingConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent.max(1));
        Self {
            store,
            watchlist,
            dedupe,
            sink,
            config,
            permits,
            cancel: CancellationToken::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one fetch-diff-extract pass over `addresses`.
    ///
    /// Returns the cycle's events without handing them to the sink.
    pub async fn run_cycle(&self, addresses: &[WatchedAddress]) -> Vec<TradeEvent> {
        join_all(addresses.iter().map(|a| self.poll_address(&a.address)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn poll_address(&self, address: &str) -> Vec<TradeEvent> {
        let signatures = match self
            .guarded(
                "list_signatures",
                self.store.get_signatures(address, self.config.signature_limit),
            )
            .await
        {
            Ok(signatures) => signatures,
            Err(e) => {
                warn!(address, stage = "list_signatures", error = %e, "Signature listing failed");
                return Vec::new();
            }
        };

        let fresh: Vec<SignatureInfo> = signatures
            .into_iter()
            .filter(|info| self.dedupe.is_new(address, &info.signature))
            .filter(|info| {
                if info.is_failed() {
                    debug!(address, signature = %info.signature, "Skipping failed transaction");
                    self.record_drop("failed_tx");
                    return false;
                }
                true
            })
            .collect();

        if fresh.is_empty() {
            return Vec::new();
        }
        debug!(address, count = fresh.len(), "New signatures");

        join_all(fresh.iter().map(|info| self.fetch_trade(address, &info.signature)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn fetch_trade(&self, address: &str, signature: &str) -> Option<TradeEvent> {
        match self
            .guarded("get_transaction", self.store.get_transaction(signature))
            .await
        {
            Ok(Some(tx)) => {
                let event = extract_trade(&tx, address, signature, sources::POLLING);
                if event.is_none() {
                    debug!(address, signature, "No trade in transaction");
                    self.record_drop("no_trade");
                }
                event
            }
            Ok(None) => {
                // Not indexed yet; let a later cycle retry it
                debug!(address, signature, "Transaction not available yet");
                self.dedupe.forget(signature);
                self.record_drop("not_found");
                None
            }
            Err(e) => {
                warn!(address, signature, stage = "get_transaction", error = %e, "Transaction fetch failed");
                self.dedupe.forget(signature);
                None
            }
        }
    }

    /// Apply the concurrency cap and the per-request timeout to one call
    async fn guarded<T, F>(&self, stage: &str, request: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, RpcError>>,
    {
        let result = match self.permits.acquire().await {
            Ok(_permit) => match timeout(self.config.request_timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout(
                    self.config.request_timeout.as_millis() as u64,
                )),
            },
            Err(_) => Err(RpcError::Http("request semaphore closed".to_string())),
        };

        if result.is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.rpc_error(stage);
            }
        }
        result
    }

    fn record_drop(&self, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.dropped(reason);
        }
    }

    fn emit(&self, events: Vec<TradeEvent>) {
        for event in events {
            info!(
                address = %event.address,
                token = %event.asset_id,
                direction = %event.direction,
                quantity = event.quantity,
                signature = %event.raw_reference,
                "Trade detected"
            );
            if let Some(metrics) = &self.metrics {
                metrics.events_total.with_label_values(&[sources::POLLING]).inc();
            }
            self.sink.on_event(event);
        }
    }

    fn set_watched(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.watched_addresses.set(count as i64);
        }
    }

    /// Replace the list between cycles; keep the previous one on failure
    async fn refresh(&self, addresses: &mut Vec<WatchedAddress>) {
        match self.watchlist.active_addresses().await {
            Ok(list) if list.is_empty() => {
                warn!("Watch-list came back empty, keeping previous addresses");
            }
            Ok(list) => {
                if list.len() != addresses.len() {
                    info!(count = list.len(), "Watch-list refreshed");
                }
                *addresses = list;
                self.set_watched(addresses.len());
            }
            Err(e) => {
                warn!(error = %e, "Watch-list refresh failed, keeping previous addresses");
            }
        }
    }
}

#[async_trait]
impl TradeSource for PollingSource {
    fn name(&self) -> &'static str {
        sources::POLLING
    }

    async fn start(&self) -> AppResult<()> {
        let mut addresses = self.watchlist.active_addresses().await?;
        if addresses.is_empty() {
            return Err(AppError::Config(
                "watch-list is empty, polling needs at least one address".to_string(),
            ));
        }
        self.set_watched(addresses.len());

        // An unreachable store at startup is a setup problem, not a blip
        self.guarded("health_check", self.store.health_check())
            .await
            .map_err(|e| AppError::Transport(format!("transaction store unreachable: {}", e)))?;

        info!(
            addresses = addresses.len(),
            interval_secs = self.config.interval.as_secs_f64(),
            max_concurrent = self.config.max_concurrent,
            "Polling started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let events = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Stop requested mid-cycle, discarding partial results");
                    break;
                }
                events = self.run_cycle(&addresses) => events,
            };

            self.emit(events);
            self.refresh(&mut addresses).await;
        }

        info!("Polling stopped");
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
