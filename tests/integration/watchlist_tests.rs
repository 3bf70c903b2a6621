//! Watch-list Integration Tests
//!
//! Exercises the SQLite-backed provider on a temporary database:
//! - Inactive rows and malformed addresses are skipped
//! - Duplicates collapse, last row wins
//! - Category filter and limit

use crate::support::{TOKEN, WALLET_A, WALLET_B};
use redundancy_scout::{SqliteWatchlist, WatchlistProvider};
use tempfile::TempDir;

async fn seeded(dir: &TempDir, categories: Vec<String>, limit: Option<u32>) -> SqliteWatchlist {
    let watchlist = SqliteWatchlist::open(&dir.path().join("wallets.db"), categories, limit)
        .await
        .unwrap();

    watchlist.add_wallet(WALLET_A, Some("Top Trader"), true).await.unwrap();
    watchlist.add_wallet("not-a-pubkey", Some("Top Trader"), true).await.unwrap();
    watchlist.add_wallet(WALLET_B, Some("Top Trader"), false).await.unwrap();
    watchlist.add_wallet(WALLET_A, Some("Sniper"), true).await.unwrap();
    watchlist.add_wallet(TOKEN, Some("Whale"), true).await.unwrap();
    watchlist
}

#[tokio::test]
async fn test_active_rows_deduplicated() {
    let dir = TempDir::new().unwrap();
    let watchlist = seeded(&dir, vec![], None).await;

    let addresses = watchlist.active_addresses().await.unwrap();
    let names: Vec<&str> = addresses.iter().map(|a| a.address.as_str()).collect();

    assert_eq!(names, vec![WALLET_A, TOKEN]);
    assert_eq!(addresses[0].category.as_deref(), Some("Sniper"));
    assert!(addresses.iter().all(|a| (a.weight - 1.0).abs() < f64::EPSILON));
}

#[tokio::test]
async fn test_category_filter() {
    let dir = TempDir::new().unwrap();
    let watchlist = seeded(&dir, vec!["Whale".to_string()], None).await;

    let addresses = watchlist.active_addresses().await.unwrap();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].address, TOKEN);
}

#[tokio::test]
async fn test_limit_applies() {
    let dir = TempDir::new().unwrap();
    let watchlist = seeded(&dir, vec![], Some(1)).await;

    let addresses = watchlist.active_addresses().await.unwrap();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].address, WALLET_A);
}

#[tokio::test]
async fn test_reopen_keeps_rows() {
    let dir = TempDir::new().unwrap();
    drop(seeded(&dir, vec![], None).await);

    let reopened = SqliteWatchlist::open(&dir.path().join("wallets.db"), vec![], None)
        .await
        .unwrap();
    assert_eq!(reopened.active_addresses().await.unwrap().len(), 2);
}
