//! Trade Extractor Unit Tests
//!
//! Realistic jsonParsed records:
//! - SOL -> token swap through an AMM (pool accounts owned by others)
//! - token -> USDC sale
//! - token -> token swap
//! - wrapped SOL close/open noise

use redundancy_scout::constants::mints;
use redundancy_scout::ingestion::extract_trade;
use redundancy_scout::Direction;
use serde_json::{json, Value};

const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
const POOL: &str = "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1";
const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const JUP: &str = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";

fn balance(index: u64, mint: &str, owner: &str, ui: &str, decimals: u64) -> Value {
    json!({
        "accountIndex": index,
        "mint": mint,
        "owner": owner,
        "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
        "uiTokenAmount": {
            "amount": "0",
            "decimals": decimals,
            "uiAmount": ui.parse::<f64>().ok(),
            "uiAmountString": ui
        }
    })
}

fn record(pre_lamports: u64, post_lamports: u64, pre: Vec<Value>, post: Vec<Value>) -> Value {
    json!({
        "blockTime": 1_717_171_717,
        "slot": 268_000_000u64,
        "transaction": {
            "signatures": ["3xVk"],
            "message": {
                "accountKeys": [
                    { "pubkey": WALLET, "signer": true, "writable": true, "source": "transaction" },
                    { "pubkey": POOL, "signer": false, "writable": true, "source": "transaction" }
                ]
            }
        },
        "meta": {
            "err": null,
            "fee": 5000,
            "preBalances": [pre_lamports, 2_039_280u64],
            "postBalances": [post_lamports, 2_039_280u64],
            "preTokenBalances": pre,
            "postTokenBalances": post
        }
    })
}

#[test]
fn test_sol_for_token_swap_is_buy() {
    let tx = record(
        3_000_000_000,
        1_999_995_000,
        vec![
            balance(2, BONK, POOL, "90000000", 5),
            balance(3, mints::SOL, POOL, "400", 9),
        ],
        vec![
            balance(2, BONK, POOL, "89750000", 5),
            balance(3, mints::SOL, POOL, "401", 9),
            balance(4, BONK, WALLET, "250000", 5),
        ],
    );

    let event = extract_trade(&tx, WALLET, "3xVk", "solana_polling").unwrap();
    assert_eq!(event.asset_id, BONK);
    assert_eq!(event.direction, Direction::Buy);
    assert!((event.quantity - 250_000.0).abs() < 1e-6);
    assert_eq!(event.observed_at.timestamp(), 1_717_171_717);
    assert_eq!(event.raw_reference, "3xVk");
}

#[test]
fn test_token_for_usdc_is_sell() {
    let tx = record(
        1_000_000_000,
        999_995_000,
        vec![
            balance(2, BONK, WALLET, "1000000", 5),
            balance(3, mints::USDC, WALLET, "5", 6),
        ],
        vec![
            balance(2, BONK, WALLET, "0", 5),
            balance(3, mints::USDC, WALLET, "27.5", 6),
        ],
    );

    let event = extract_trade(&tx, WALLET, "sig", "solana_ws").unwrap();
    assert_eq!(event.direction, Direction::Sell);
    assert!((event.quantity - 1_000_000.0).abs() < 1e-6);
    assert_eq!(event.source_tag, "solana_ws");
}

#[test]
fn test_token_for_token_swap_uses_largest_move() {
    let tx = record(
        1_000_000_000,
        999_995_000,
        vec![balance(2, JUP, WALLET, "120", 6)],
        vec![balance(2, JUP, WALLET, "20", 6), balance(3, BONK, WALLET, "50000", 5)],
    );

    let event = extract_trade(&tx, WALLET, "sig", "test").unwrap();
    assert_eq!(event.asset_id, BONK);
    assert_eq!(event.direction, Direction::Buy);
}

#[test]
fn test_fee_only_transaction_is_not_a_trade() {
    let tx = record(1_000_000_000, 999_995_000, vec![], vec![]);
    assert!(extract_trade(&tx, WALLET, "sig", "test").is_none());
}

#[test]
fn test_split_token_accounts_are_summed() {
    let tx = record(
        1_000_000_000,
        1_499_995_000,
        vec![balance(2, BONK, WALLET, "300", 5), balance(3, BONK, WALLET, "200", 5)],
        vec![balance(2, BONK, WALLET, "0", 5), balance(3, BONK, WALLET, "100", 5)],
    );

    let event = extract_trade(&tx, WALLET, "sig", "test").unwrap();
    assert_eq!(event.direction, Direction::Sell);
    assert!((event.quantity - 400.0).abs() < 1e-9);
}

#[test]
fn test_missing_block_time_uses_now() {
    let mut tx = record(
        1_000_000_000,
        999_995_000,
        vec![],
        vec![balance(2, BONK, WALLET, "1", 5)],
    );
    tx["blockTime"] = Value::Null;

    let before = chrono::Utc::now();
    let event = extract_trade(&tx, WALLET, "sig", "test").unwrap();
    assert!(event.observed_at >= before);
}
