//! Trade extraction from raw `getTransaction` records
//!
//! Diffs the watched address' pre/post balances and maps the result to at
//! most one `TradeEvent`:
//! - currency + asset deltas: the asset leg is the trade
//! - asset-only deltas (asset-for-asset swap): the largest move is the trade
//! - currency-only or no deltas above the noise floor: not a trade
//!
//! Malformed balance data yields `None`; a bad record never aborts a batch.

use crate::constants::{mints, BALANCE_EPSILON, LAMPORTS_PER_SOL};
use crate::models::{Direction, TradeEvent};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Extract the trade (if any) that `address` made in transaction `tx`
///
/// # Arguments
/// * `tx` - `result` of a jsonParsed `getTransaction` call
/// * `address` - Watched address the transaction concerns
/// * `signature` - Transaction signature, kept as the event's raw reference
/// * `source_tag` - Transport that produced the record
pub fn extract_trade(
    tx: &Value,
    address: &str,
    signature: &str,
    source_tag: &str,
) -> Option<TradeEvent> {
    let meta = tx.get("meta").filter(|m| !m.is_null())?;

    if meta.get("err").map(|e| !e.is_null()).unwrap_or(false) {
        tracing::trace!(signature, "Skipping failed transaction");
        return None;
    }

    let deltas = balance_deltas(tx, meta, address)?;
    let (asset_id, delta) = pick_traded_asset(&deltas)?;

    let observed_at = tx
        .get("blockTime")
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    Some(TradeEvent::new(
        address,
        asset_id,
        Direction::from_delta(delta),
        delta.abs(),
        source_tag,
        observed_at,
        signature,
    ))
}

/// Signed per-mint deltas above the noise floor, sorted by mint.
///
/// `None` when any balance row for the address is unreadable.
fn balance_deltas(tx: &Value, meta: &Value, address: &str) -> Option<BTreeMap<String, f64>> {
    let pre = token_balances(meta.get("preTokenBalances"), address)?;
    let post = token_balances(meta.get("postTokenBalances"), address)?;

    let mut deltas: BTreeMap<String, f64> = BTreeMap::new();
    for mint in pre.keys().chain(post.keys()) {
        if deltas.contains_key(mint) {
            continue;
        }
        let before = pre.get(mint).copied().unwrap_or(0.0);
        let after = post.get(mint).copied().unwrap_or(0.0);
        deltas.insert(mint.clone(), after - before);
    }

    if let Some(native) = native_sol_delta(tx, meta, address) {
        *deltas.entry(mints::SOL.to_string()).or_insert(0.0) += native;
    }

    deltas.retain(|_, delta| delta.is_finite() && delta.abs() > BALANCE_EPSILON);
    Some(deltas)
}

/// Sum of token balances per mint owned by `address`.
///
/// Rows without an `owner` field are attributed to the address; rows owned
/// by someone else are ignored.
fn token_balances(rows: Option<&Value>, address: &str) -> Option<BTreeMap<String, f64>> {
    let mut balances = BTreeMap::new();

    let rows = match rows {
        None => return Some(balances),
        Some(Value::Null) => return Some(balances),
        Some(value) => value.as_array()?,
    };

    for row in rows {
        if let Some(owner) = row.get("owner").and_then(Value::as_str) {
            if owner != address {
                continue;
            }
        }

        let mint = row.get("mint").and_then(Value::as_str)?;
        let amount = ui_amount(row.get("uiTokenAmount")?)?;
        *balances.entry(mint.to_string()).or_insert(0.0) += amount;
    }

    Some(balances)
}

/// Decimal-adjusted amount from a `uiTokenAmount` object.
///
/// `uiAmount` is null for zero balances, so the string forms are preferred.
fn ui_amount(token_amount: &Value) -> Option<f64> {
    if let Some(s) = token_amount.get("uiAmountString").and_then(Value::as_str) {
        if let Ok(v) = s.parse::<f64>() {
            return Some(v);
        }
    }

    if let Some(v) = token_amount.get("uiAmount").and_then(Value::as_f64) {
        return Some(v);
    }

    let raw = token_amount
        .get("amount")
        .and_then(Value::as_str)?
        .parse::<f64>()
        .ok()?;
    let decimals = token_amount.get("decimals").and_then(Value::as_u64)?;
    Some(raw / 10f64.powi(decimals as i32))
}

/// Account keys of a jsonParsed transaction in message order; the fee
/// payer comes first. Accepts both plain strings and `{ "pubkey": .. }`.
pub fn account_keys(tx: &Value) -> Vec<String> {
    tx.pointer("/transaction/message/accountKeys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(|key| {
                    key.as_str()
                        .or_else(|| key.get("pubkey").and_then(Value::as_str))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Native SOL change of `address` in SOL, with the fee added back when the
/// address paid it. `None` when the address or balances can't be located.
fn native_sol_delta(tx: &Value, meta: &Value, address: &str) -> Option<f64> {
    let index = account_keys(tx).iter().position(|key| key == address)?;

    let pre = meta.get("preBalances")?.as_array()?.get(index)?.as_u64()?;
    let post = meta.get("postBalances")?.as_array()?.get(index)?.as_u64()?;

    let mut lamports = post as i128 - pre as i128;
    if index == 0 {
        lamports += meta.get("fee").and_then(Value::as_u64).unwrap_or(0) as i128;
    }

    Some(lamports as f64 / LAMPORTS_PER_SOL)
}

/// Choose the traded asset among the surviving deltas.
///
/// Only non-currency mints can be the traded asset. Among several, the
/// largest absolute move wins; ties go to the lexicographically first mint.
fn pick_traded_asset(deltas: &BTreeMap<String, f64>) -> Option<(String, f64)> {
    let mut best: Option<(&String, f64)> = None;

    for (mint, &delta) in deltas.iter().filter(|(m, _)| !mints::is_currency(m)) {
        match best {
            Some((_, current)) if delta.abs() <= current.abs() => {}
            _ => best = Some((mint, delta)),
        }
    }

    if best.is_none() && !deltas.is_empty() {
        tracing::trace!(mints = deltas.len(), "Only currency movements, not a trade");
    }

    best.map(|(mint, delta)| (mint.clone(), delta))
}
