//! Correlation layer
//!
//! Consumes the normalized event stream and raises a `TradeSignal` when
//! several distinct addresses trade the same asset in the same direction
//! within a sliding window.

pub mod engine;
pub mod sink;

pub use crate::config::{CorrelationConfig, ScoringWeights};
pub use engine::{confidence, CorrelationEngine};
pub use sink::{ChannelSignalSink, CorrelationSink, LoggingSignalSink, SignalSink};
