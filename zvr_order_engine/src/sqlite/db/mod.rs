//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers obtain a connection from a pool, or open a transaction when the operation must be atomic, and
//! pass `&mut tx` straight through.
//!
//! The order row lock is taken with [`orders::lock_order_by_code`] or [`orders::lock_order_by_id`]. It must be the
//! first statement of any transaction that mutates an order, so that the transaction holds the write lock before it
//! reads anything.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod email_log;
pub mod history;
pub mod job_locks;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod reconciliation;
pub mod refunds;
pub mod stock;
pub mod sync_log;

const SQLITE_DB_URL: &str = "sqlite://data/zvr_store.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub fn db_url() -> String {
    let result = env::var("ZVR_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ ZVR_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Truncates free text to what the history tables accept.
pub(crate) fn clip_reason(reason: Option<&str>) -> Option<String> {
    reason.map(|r| r.chars().take(512).collect())
}
