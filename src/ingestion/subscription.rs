//! Subscription transport
//!
//! Keeps one `logsSubscribe` WebSocket session open and reconnects with
//! backoff when it breaks:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> SUBSCRIBING -> LISTENING
//!       ^                                          |
//!       +------------- error / close / idle -------+
//! ```
//!
//! Notifications only carry a signature, so every new one is resolved
//! through the transaction store and the same extractor the polling
//! transport uses. Those detail fetches run beside the read loop in an
//! ordered queue: the socket keeps being read (pings, idle detection,
//! further notifications) while a fetch is outstanding, and events still
//! leave in notification order.

use crate::config::AppConfig;
use crate::constants::sources;
use crate::error::{AppError, AppResult, RpcError};
use crate::ingestion::{
    account_keys, extract_trade, Backoff, EventSink, SignatureDeduplicator, TradeSource,
    TransactionStore,
};
use crate::metrics::Metrics;
use crate::models::{TradeEvent, WatchedAddress};
use crate::watchlist::WatchlistProvider;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesOrdered;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending detail fetch for one notification
type DetailFetch<'a> = BoxFuture<'a, Option<TradeEvent>>;

/// Lifecycle of the socket session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Listening,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Subscribing => write!(f, "SUBSCRIBING"),
            ConnectionState::Listening => write!(f, "LISTENING"),
        }
    }
}

/// Subscription loop settings
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub ws_url: String,
    pub commitment: String,
    /// One "all" subscription instead of one per address
    pub subscribe_all: bool,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// `false` keeps the reconnect delay at `reconnect_base`
    pub exponential_backoff: bool,
    /// Extra detail fetch attempts for a notified signature
    pub detail_fetch_retries: u32,
    pub detail_fetch_retry_delay: Duration,
    /// Bound on the socket connect and on every detail fetch attempt
    pub request_timeout: Duration,
    /// Detail fetches allowed in flight before reading pauses
    pub max_in_flight: usize,
    /// Silence after which the session is considered dead
    pub idle_timeout: Duration,
    /// How long to wait for subscription acknowledgments
    pub ack_timeout: Duration,
}

impl SubscriptionConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            ws_url: config.rpc.ws_url.clone(),
            commitment: config.rpc.commitment.clone(),
            subscribe_all: config.ingestion.subscribe_all,
            reconnect_base: Duration::from_millis(config.ingestion.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.ingestion.reconnect_max_ms),
            exponential_backoff: config.ingestion.exponential_backoff,
            detail_fetch_retries: config.ingestion.detail_fetch_retries,
            detail_fetch_retry_delay: Duration::from_millis(
                config.ingestion.detail_fetch_retry_delay_ms,
            ),
            request_timeout: config.rpc.request_timeout(),
            max_in_flight: config.rpc.max_concurrent_requests,
            idle_timeout: Duration::from_secs(config.ingestion.idle_timeout_secs),
            ack_timeout: Duration::from_secs(config.ingestion.ack_timeout_secs),
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_base,
            self.reconnect_max,
            self.exponential_backoff,
        )
    }
}

/// Inbound text frame, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `{"id": n, "result": <subscription id>}`
    Ack { id: u64, subscription_id: u64 },
    /// `{"id": n, "error": {..}}`
    AckError { id: u64, message: String },
    /// `logsNotification` push
    Notification {
        subscription_id: u64,
        signature: String,
        failed: bool,
    },
    /// Well-formed but irrelevant (unsubscribe acks, other methods)
    Other,
}

/// Classify one text frame; `None` when it is not valid JSON-RPC or a
/// notification lacks its subscription id or signature.
pub fn parse_frame(text: &str) -> Option<Frame> {
    let value: Value = serde_json::from_str(text).ok()?;
    if !value.is_object() {
        return None;
    }

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Some(Frame::AckError { id, message });
        }
        return Some(match value.get("result").and_then(Value::as_u64) {
            Some(subscription_id) => Frame::Ack {
                id,
                subscription_id,
            },
            None => Frame::Other,
        });
    }

    if value.get("method").and_then(Value::as_str) != Some("logsNotification") {
        return Some(Frame::Other);
    }

    let params = value.get("params")?;
    let subscription_id = params.get("subscription")?.as_u64()?;
    let event = params.pointer("/result/value")?;
    let signature = event.get("signature")?.as_str()?.to_string();
    let failed = event.get("err").map(|e| !e.is_null()).unwrap_or(false);

    Some(Frame::Notification {
        subscription_id,
        signature,
        failed,
    })
}

/// Per-session bookkeeping. `None` stands for the "all" subscription.
#[derive(Default)]
struct Session {
    /// Request id -> address, until acknowledged
    pending: HashMap<u64, Option<String>>,
    /// Subscription id -> address
    active: HashMap<u64, Option<String>>,
}

/// WebSocket subscription ingestion loop
pub struct SubscriptionSource {
    store: Arc<dyn TransactionStore>,
    watchlist: Arc<dyn WatchlistProvider>,
    dedupe: Arc<SignatureDeduplicator>,
    sink: Arc<dyn EventSink>,
    config: SubscriptionConfig,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    metrics: Option<Arc<Metrics>>,
}

impl SubscriptionSource {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        watchlist: Arc<dyn WatchlistProvider>,
        dedupe: Arc<SignatureDeduplicator>,
        sink: Arc<dyn EventSink>,
        config: SubscriptionConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            store,
            watchlist,
            dedupe,
            sink,
            config,
            state,
            cancel: CancellationToken::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Subscription state changed");
        }
    }

    async fn connect(&self) -> AppResult<Socket> {
        self.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            result = timeout(self.config.request_timeout, connect_async(self.config.ws_url.as_str())) => result,
        };

        match connected {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(AppError::Transport(format!(
                "connect to {} failed: {}",
                self.config.ws_url, e
            ))),
            Err(_) => Err(AppError::Transport(format!(
                "connect to {} timed out after {}ms",
                self.config.ws_url,
                self.config.request_timeout.as_millis()
            ))),
        }
    }

    /// One subscribe-listen session on an open socket. Only returns on
    /// failure or cancellation; the backoff is reset once subscriptions
    /// are set up.
    async fn run_session(
        &self,
        ws: Socket,
        addresses: &[WatchedAddress],
        backoff: &mut Backoff,
    ) -> AppResult<()> {
        let (mut write, mut read) = ws.split();

        self.set_state(ConnectionState::Subscribing);
        let mut session = Session::default();

        let targets: Vec<Option<String>> = if self.config.subscribe_all {
            vec![None]
        } else {
            addresses.iter().map(|a| Some(a.address.clone())).collect()
        };

        for (i, target) in targets.into_iter().enumerate() {
            let id = i as u64 + 1;
            let filter = match &target {
                Some(address) => json!({ "mentions": [address] }),
                None => json!("all"),
            };
            let request = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "logsSubscribe",
                "params": [filter, { "commitment": self.config.commitment }]
            });
            write
                .send(Message::Text(request.to_string().into()))
                .await
                .map_err(|e| AppError::Transport(format!("subscribe request failed: {}", e)))?;
            session.pending.insert(id, target);
        }

        info!(
            ws_url = %self.config.ws_url,
            requests = session.pending.len(),
            "Connected, subscriptions sent"
        );

        let ack_deadline = Instant::now() + self.config.ack_timeout;
        let max_in_flight = self.config.max_in_flight.max(1);
        let mut last_frame = Instant::now();
        let mut listening = false;
        let mut details: FuturesOrdered<DetailFetch<'_>> = FuturesOrdered::new();

        let ended = loop {
            if !listening && session.pending.is_empty() {
                listening = true;
                backoff.reset();
                self.set_state(ConnectionState::Listening);
                info!(subscriptions = session.active.len(), "Listening for notifications");
            }

            let idle_deadline = last_frame + self.config.idle_timeout;
            let deadline = if listening {
                idle_deadline
            } else {
                idle_deadline.min(ack_deadline)
            };
            let reading = details.len() < max_in_flight;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Err(AppError::Cancelled);
                }
                Some(event) = details.next(), if !details.is_empty() => {
                    if let Some(event) = event {
                        self.emit(event);
                    }
                }
                next = timeout_at(deadline, read.next()), if reading => {
                    let message = match next {
                        Err(_) if !listening && Instant::now() >= ack_deadline => {
                            warn!(
                                missing = session.pending.len(),
                                "Subscription acknowledgments timed out, listening with partial set"
                            );
                            session.pending.clear();
                            continue;
                        }
                        Err(_) => {
                            break AppError::Transport(format!(
                                "no frames for {}s",
                                self.config.idle_timeout.as_secs()
                            ))
                        }
                        Ok(None) => break AppError::Transport("stream ended".to_string()),
                        Ok(Some(Err(e))) => break AppError::Transport(e.to_string()),
                        Ok(Some(Ok(message))) => message,
                    };
                    last_frame = Instant::now();

                    match message {
                        Message::Text(text) => {
                            self.handle_text(&text, &mut session, addresses, &mut details);
                        }
                        Message::Ping(payload) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                break AppError::Transport(format!("pong failed: {}", e));
                            }
                        }
                        Message::Close(frame) => {
                            break AppError::Transport(format!("closed by server: {:?}", frame));
                        }
                        _ => {}
                    }
                }
            }
        };

        // Signatures already passed the deduplicator; finish them before
        // reconnecting so they are not lost with the socket
        if !details.is_empty() {
            debug!(in_flight = details.len(), "Finishing detail fetches");
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                    next = details.next() => match next {
                        Some(Some(event)) => self.emit(event),
                        Some(None) => {}
                        None => break,
                    },
                }
            }
        }

        Err(ended)
    }

    fn handle_text<'a>(
        &'a self,
        text: &str,
        session: &mut Session,
        addresses: &'a [WatchedAddress],
        details: &mut FuturesOrdered<DetailFetch<'a>>,
    ) {
        let frame = match parse_frame(text) {
            Some(frame) => frame,
            None => {
                debug!(len = text.len(), "Dropping malformed frame");
                self.record_drop("malformed_frame");
                return;
            }
        };

        match frame {
            Frame::Ack {
                id,
                subscription_id,
            } => {
                if let Some(target) = session.pending.remove(&id) {
                    debug!(
                        address = target.as_deref().unwrap_or("all"),
                        subscription_id,
                        "Subscription acknowledged"
                    );
                    session.active.insert(subscription_id, target);
                }
            }
            Frame::AckError { id, message } => {
                if let Some(target) = session.pending.remove(&id) {
                    warn!(
                        address = target.as_deref().unwrap_or("all"),
                        error = %message,
                        "Subscription rejected"
                    );
                }
            }
            Frame::Notification {
                subscription_id,
                signature,
                failed,
            } => {
                let target = match session.active.get(&subscription_id) {
                    Some(target) => target.clone(),
                    None => {
                        debug!(subscription_id, "Notification for unknown subscription");
                        self.record_drop("unknown_subscription");
                        return;
                    }
                };
                if failed {
                    debug!(signature = %signature, "Skipping failed transaction");
                    self.record_drop("failed_tx");
                    return;
                }
                let scope = target.as_deref().unwrap_or("all");
                if !self.dedupe.is_new(scope, &signature) {
                    return;
                }
                details.push_back(self.resolve_notification(target, signature, addresses).boxed());
            }
            Frame::Other => {}
        }
    }

    /// Fetch and extract one notified transaction
    async fn resolve_notification<'a>(
        &'a self,
        target: Option<String>,
        signature: String,
        addresses: &'a [WatchedAddress],
    ) -> Option<TradeEvent> {
        let tx = match self.fetch_detail(&signature).await {
            Some(tx) => tx,
            None => {
                debug!(signature = %signature, "Transaction never became available");
                self.record_drop("not_found");
                return None;
            }
        };

        let address = match target {
            Some(address) => address,
            None => match resolve_address(&tx, addresses) {
                Some(address) => address,
                None => {
                    self.record_drop("unwatched");
                    return None;
                }
            },
        };

        let event = extract_trade(&tx, &address, &signature, sources::SUBSCRIPTION);
        if event.is_none() {
            debug!(address = %address, signature = %signature, "No trade in transaction");
            self.record_drop("no_trade");
        }
        event
    }

    /// Fetch a notified transaction, retrying while it is not indexed yet.
    /// Each attempt is bounded by `request_timeout`.
    async fn fetch_detail(&self, signature: &str) -> Option<Value> {
        for attempt in 0..=self.config.detail_fetch_retries {
            if attempt > 0 {
                sleep(self.config.detail_fetch_retry_delay).await;
            }

            let result = match timeout(
                self.config.request_timeout,
                self.store.get_transaction(signature),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout(
                    self.config.request_timeout.as_millis() as u64,
                )),
            };

            match result {
                Ok(Some(tx)) => return Some(tx),
                Ok(None) => debug!(signature, attempt, "Transaction not available yet"),
                Err(e) => {
                    warn!(signature, attempt, stage = "get_transaction", error = %e, "Transaction fetch failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.rpc_error("get_transaction");
                    }
                }
            }
        }
        None
    }

    fn emit(&self, event: TradeEvent) {
        info!(
            address = %event.address,
            token = %event.asset_id,
            direction = %event.direction,
            quantity = event.quantity,
            signature = %event.raw_reference,
            "Trade detected"
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .events_total
                .with_label_values(&[sources::SUBSCRIPTION])
                .inc();
        }
        self.sink.on_event(event);
    }

    fn record_drop(&self, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.dropped(reason);
        }
    }

    fn set_watched(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.watched_addresses.set(count as i64);
        }
    }
}

/// Watched address a transaction belongs to in "all" mode: the first
/// watched account key, or the fee payer when nothing is watched.
fn resolve_address(tx: &Value, addresses: &[WatchedAddress]) -> Option<String> {
    let keys = account_keys(tx);
    if addresses.is_empty() {
        return keys.into_iter().next();
    }
    keys.into_iter()
        .find(|key| addresses.iter().any(|a| &a.address == key))
}

#[async_trait]
impl TradeSource for SubscriptionSource {
    fn name(&self) -> &'static str {
        sources::SUBSCRIPTION
    }

    async fn start(&self) -> AppResult<()> {
        let mut addresses = self.watchlist.active_addresses().await?;
        if addresses.is_empty() && !self.config.subscribe_all {
            return Err(AppError::Config(
                "watch-list is empty, address-filtered subscription needs at least one address"
                    .to_string(),
            ));
        }
        self.set_watched(addresses.len());

        let mut backoff = self.config.backoff();
        let mut first = true;

        loop {
            if !first {
                match self.watchlist.active_addresses().await {
                    Ok(list) if !list.is_empty() || self.config.subscribe_all => {
                        addresses = list;
                        self.set_watched(addresses.len());
                    }
                    Ok(_) => warn!("Watch-list came back empty, keeping previous addresses"),
                    Err(e) => warn!(error = %e, "Watch-list refresh failed, keeping previous addresses"),
                }
            }

            let outcome = match self.connect().await {
                Ok(ws) => self.run_session(ws, &addresses, &mut backoff).await,
                // Endpoint unreachable before any session: report, don't retry
                Err(e) if first && !e.is_cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
                Err(e) => Err(e),
            };
            first = false;

            match outcome {
                Err(e) if e.is_cancelled() => break,
                Err(e) => warn!(error = %e, "Subscription session ended"),
                Ok(()) => {}
            }
            self.set_state(ConnectionState::Disconnected);

            let delay = backoff.next_delay();
            if let Some(metrics) = &self.metrics {
                metrics.reconnects_total.inc();
            }
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Subscription stopped");
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
