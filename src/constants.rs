/// Solana token mint addresses treated as "currency" when classifying trades.
///
/// A balance change in one of these mints is the payment leg of a swap,
/// never the traded asset itself.
pub mod mints {
    /// Wrapped SOL (native SOL deltas are folded into this mint)
    pub const SOL: &str = "So11111111111111111111111111111111111111112";
    /// USDC (Circle USD Coin)
    pub const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    /// USDT (Tether USD)
    pub const USDT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

    /// All currency-like mints
    pub const CURRENCY: [&str; 3] = [SOL, USDC, USDT];

    /// Whether `mint` is on the currency allow-list
    pub fn is_currency(mint: &str) -> bool {
        CURRENCY.contains(&mint)
    }
}

/// Balance deltas at or below this magnitude are noise, not trades.
pub const BALANCE_EPSILON: f64 = 0.000_001;

/// Longest correlation window accepted (one day)
pub const MAX_WINDOW_SECS: u64 = 86_400;

/// 1 SOL = 1,000,000,000 lamports
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Source tags stamped on every `TradeEvent`
pub mod sources {
    pub const POLLING: &str = "solana_polling";
    pub const SUBSCRIPTION: &str = "solana_ws";
}
