//! Signal sinks and the engine-side event sink

use crate::correlation::CorrelationEngine;
use crate::ingestion::EventSink;
use crate::models::{TradeEvent, TradeSignal};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Receives every signal the engine emits.
///
/// Called synchronously on the ingesting task after the engine lock is
/// released. Backpressure is the sink's business.
pub trait SignalSink: Send + Sync {
    fn on_signal(&self, signal: &TradeSignal);
}

impl<F> SignalSink for F
where
    F: Fn(&TradeSignal) + Send + Sync,
{
    fn on_signal(&self, signal: &TradeSignal) {
        self(signal)
    }
}

/// Writes each signal as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSignalSink;

impl SignalSink for LoggingSignalSink {
    fn on_signal(&self, signal: &TradeSignal) {
        tracing::info!(
            token = %signal.token,
            direction = %signal.side,
            wallet_count = signal.wallet_count,
            trade_count = signal.trade_count,
            total_amount = signal.total_amount,
            span_secs = signal.time_span_seconds,
            confidence = signal.confidence,
            wallets = ?signal.wallets,
            "SIGNAL: {}",
            signal
        );
    }
}

/// Forwards signals into a bounded channel, dropping when it is full
pub struct ChannelSignalSink {
    tx: mpsc::Sender<TradeSignal>,
}

impl ChannelSignalSink {
    pub fn new(tx: mpsc::Sender<TradeSignal>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of a fresh channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TradeSignal>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl SignalSink for ChannelSignalSink {
    fn on_signal(&self, signal: &TradeSignal) {
        match self.tx.try_send(signal.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    token = %dropped.token,
                    direction = %dropped.side,
                    "Signal channel full, dropping signal"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Signal channel closed");
            }
        }
    }
}

/// Hands ingested events to the engine, and optionally to a second sink
pub struct CorrelationSink {
    engine: Arc<CorrelationEngine>,
    forward: Option<Arc<dyn EventSink>>,
}

impl CorrelationSink {
    pub fn new(engine: Arc<CorrelationEngine>) -> Self {
        Self {
            engine,
            forward: None,
        }
    }

    pub fn with_forward(mut self, forward: Arc<dyn EventSink>) -> Self {
        self.forward = Some(forward);
        self
    }
}

impl EventSink for CorrelationSink {
    fn on_event(&self, event: TradeEvent) {
        if let Some(forward) = &self.forward {
            forward.on_event(event.clone());
        }
        self.engine.process(event);
    }
}
