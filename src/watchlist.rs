//! Watch-list providers
//!
//! Supplies the current set of watched addresses. The polling transport
//! asks once per cycle, the subscription transport once per reconnect.
//! Duplicates collapse to one entry (last definition wins, first position
//! kept) and malformed addresses are skipped.

use crate::config::WatchlistConfig;
use crate::error::{AppError, AppResult};
use crate::models::WatchedAddress;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Source of the current watch-list
#[async_trait]
pub trait WatchlistProvider: Send + Sync {
    async fn active_addresses(&self) -> AppResult<Vec<WatchedAddress>>;
}

/// Fixed list, typically from configuration
pub struct StaticWatchlist {
    addresses: Vec<WatchedAddress>,
}

impl StaticWatchlist {
    pub fn new(addresses: Vec<WatchedAddress>) -> Self {
        Self {
            addresses: normalize(addresses),
        }
    }

    pub fn from_config(config: &WatchlistConfig) -> Self {
        let addresses = config
            .addresses
            .iter()
            .filter(|a| {
                config.categories.is_empty()
                    || a.category
                        .as_ref()
                        .map(|c| config.categories.contains(c))
                        .unwrap_or(false)
            })
            .map(|a| WatchedAddress {
                address: a.address.clone(),
                category: a.category.clone(),
                weight: a.weight,
            })
            .collect();

        let mut list = Self::new(addresses);
        if let Some(limit) = config.limit {
            list.addresses.truncate(limit as usize);
        }
        list
    }
}

#[async_trait]
impl WatchlistProvider for StaticWatchlist {
    async fn active_addresses(&self) -> AppResult<Vec<WatchedAddress>> {
        Ok(self.addresses.clone())
    }
}

/// Type alias for the SQLite connection pool
pub type DbPool = Pool<Sqlite>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS watched_wallets (
    wallet TEXT NOT NULL,
    category TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Watch-list backed by the `watched_wallets` SQLite table
pub struct SqliteWatchlist {
    pool: DbPool,
    categories: Vec<String>,
    limit: Option<u32>,
}

impl SqliteWatchlist {
    /// Open (or create) the database at `path` and ensure the schema exists
    pub async fn open(path: &Path, categories: Vec<String>, limit: Option<u32>) -> AppResult<Self> {
        let pool = init_pool(path).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self::with_pool(pool, categories, limit))
    }

    pub fn with_pool(pool: DbPool, categories: Vec<String>, limit: Option<u32>) -> Self {
        Self {
            pool,
            categories,
            limit,
        }
    }

    /// Insert a wallet row (used by importers and tests)
    pub async fn add_wallet(&self, wallet: &str, category: Option<&str>, active: bool) -> AppResult<()> {
        sqlx::query("INSERT INTO watched_wallets (wallet, category, active) VALUES (?, ?, ?)")
            .bind(wallet)
            .bind(category)
            .bind(active as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WatchlistProvider for SqliteWatchlist {
    async fn active_addresses(&self) -> AppResult<Vec<WatchedAddress>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT wallet, category FROM watched_wallets WHERE active = 1");

        if !self.categories.is_empty() {
            query.push(" AND category IN (");
            let mut separated = query.separated(", ");
            for category in &self.categories {
                separated.push_bind(category);
            }
            separated.push_unseparated(")");
        }

        query.push(" ORDER BY rowid");

        if let Some(limit) = self.limit {
            query.push(" LIMIT ");
            query.push_bind(limit as i64);
        }

        let rows: Vec<(String, Option<String>)> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Watchlist(format!("failed to load watched wallets: {}", e)))?;

        let addresses = rows
            .into_iter()
            .map(|(wallet, category)| WatchedAddress {
                address: wallet,
                category,
                weight: 1.0,
            })
            .collect();

        let list = normalize(addresses);
        info!(count = list.len(), "Loaded active wallets");
        Ok(list)
    }
}

/// Open a SQLite pool, creating the file and its directory if needed
async fn init_pool(path: &Path) -> AppResult<DbPool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Watchlist(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    info!(path = %path.display(), "Watch-list database opened");
    Ok(pool)
}

/// Drop malformed addresses and collapse duplicates
fn normalize(addresses: Vec<WatchedAddress>) -> Vec<WatchedAddress> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<WatchedAddress> = Vec::with_capacity(addresses.len());

    for address in addresses {
        if !address.is_valid_pubkey() {
            warn!(address = %address.address, "Skipping malformed watch-list address");
            continue;
        }
        match position.get(&address.address) {
            Some(&i) => unique[i] = address,
            None => {
                position.insert(address.address.clone(), unique.len());
                unique.push(address);
            }
        }
    }

    unique
}
