//! Shared fixtures for the integration tests

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use redundancy_scout::ingestion::{SignatureInfo, TransactionStore};
use redundancy_scout::RpcError;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const WALLET_A: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const WALLET_B: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const TOKEN: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
pub const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// In-memory transaction store
#[derive(Default)]
pub struct MockStore {
    signatures: Mutex<HashMap<String, Vec<SignatureInfo>>>,
    transactions: Mutex<HashMap<String, Value>>,
    /// Signatures whose detail request never answers
    hanging: Mutex<HashSet<String>>,
    detail_calls: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_signature(&self, address: &str, signature: &str) {
        self.signatures
            .lock()
            .entry(address.to_string())
            .or_default()
            .push(SignatureInfo::new(signature));
    }

    pub fn add_transaction(&self, signature: &str, tx: Value) {
        self.transactions.lock().insert(signature.to_string(), tx);
    }

    pub fn hang_on(&self, signature: &str) {
        self.hanging.lock().insert(signature.to_string());
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionStore for MockStore {
    async fn get_signatures(
        &self,
        address: &str,
        _limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        Ok(self
            .signatures
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, RpcError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.lock().contains(signature) {
            std::future::pending::<()>().await;
        }
        Ok(self.transactions.lock().get(signature).cloned())
    }
}

/// jsonParsed swap where `owner` pays USDC for `amount` of TOKEN
pub fn swap_tx(owner: &str, amount: &str, block_time: i64) -> Value {
    json!({
        "blockTime": block_time,
        "slot": 250_000_000u64,
        "transaction": { "message": { "accountKeys": [{ "pubkey": owner, "signer": true }] } },
        "meta": {
            "err": null,
            "fee": 5000,
            "preBalances": [1_000_000_000u64],
            "postBalances": [999_995_000u64],
            "preTokenBalances": [
                { "accountIndex": 1, "mint": USDC, "owner": owner,
                  "uiTokenAmount": { "uiAmountString": "500", "decimals": 6 } }
            ],
            "postTokenBalances": [
                { "accountIndex": 1, "mint": USDC, "owner": owner,
                  "uiTokenAmount": { "uiAmountString": "400", "decimals": 6 } },
                { "accountIndex": 2, "mint": TOKEN, "owner": owner,
                  "uiTokenAmount": { "uiAmountString": amount, "decimals": 5 } }
            ]
        }
    })
}

pub fn logs_notification(subscription_id: u64, signature: &str, failed: bool) -> String {
    let err = if failed {
        json!({ "InstructionError": [0, { "Custom": 1 }] })
    } else {
        Value::Null
    };
    json!({
        "jsonrpc": "2.0",
        "method": "logsNotification",
        "params": {
            "result": {
                "context": { "slot": 250_000_001u64 },
                "value": { "signature": signature, "err": err, "logs": [] }
            },
            "subscription": subscription_id
        }
    })
    .to_string()
}

/// How the scripted server answers one subscribe request
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Subscription id `100 + request id`
    Ack,
    /// JSON-RPC error response
    Reject,
    /// No answer at all
    Silent,
}

/// WebSocket server that answers the first subscribe requests of each
/// connection per `replies`, pushes `frames`, then either holds the
/// connection open or closes it.
pub struct ScriptedServer {
    pub url: String,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedServer {
    /// One acknowledged subscription per connection
    pub async fn spawn(frames: Vec<String>, hold_open: bool) -> Self {
        Self::spawn_with(vec![Reply::Ack], frames, hold_open).await
    }

    pub async fn spawn_with(replies: Vec<Reply>, frames: Vec<String>, hold_open: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let counter = connections.clone();
        let recorded = requests.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let replies = replies.clone();
                let frames = frames.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let mut ws = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };

                    for reply in replies {
                        let request: Value = loop {
                            match ws.next().await {
                                Some(Ok(Message::Text(text))) => {
                                    break serde_json::from_str(&text).unwrap()
                                }
                                Some(Ok(_)) => continue,
                                _ => return,
                            }
                        };
                        let id = request["id"].as_u64().unwrap();
                        recorded.lock().push(request);

                        let response = match reply {
                            Reply::Ack => json!({ "jsonrpc": "2.0", "result": 100 + id, "id": id }),
                            Reply::Reject => json!({
                                "jsonrpc": "2.0",
                                "error": { "code": -32602, "message": "Invalid param" },
                                "id": id
                            }),
                            Reply::Silent => continue,
                        };
                        let _ = ws.send(Message::Text(response.to_string().into())).await;
                    }

                    for frame in frames {
                        let _ = ws.send(Message::Text(frame.into())).await;
                    }

                    if hold_open {
                        while let Some(Ok(_)) = ws.next().await {}
                    } else {
                        let _ = ws.close(None).await;
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}", addr),
            connections,
            requests,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Subscribe requests received so far, across connections
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }
}
