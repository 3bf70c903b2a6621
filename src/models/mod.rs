//! Data models shared by ingestion and correlation

pub mod signal;
pub mod trade;
pub mod wallet;

pub use signal::TradeSignal;
pub use trade::{Direction, TradeEvent};
pub use wallet::WatchedAddress;
