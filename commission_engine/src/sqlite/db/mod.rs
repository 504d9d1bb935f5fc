//! # SQLite record-store functions
//!
//! "Low-level" SQLite interactions for the commission engine.
//!
//! These are simple functions that accept a `&mut SqliteConnection` argument rather than stateful structs. Callers
//! obtain a connection from the pool, or open an atomic transaction and pass `&mut *tx`, without any other changes.
//!
//! The functions that write partner balance fields live in [`partners`] and are only visible inside this module tree,
//! so they can only be reached through the ledger methods on [`super::SqliteDatabase`].
use std::{env, str::FromStr, time::Duration};

use log::{debug, info};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Error as SqlxError,
    SqlitePool,
};

pub(crate) mod clients;
pub(crate) mod orders;
pub(crate) mod partners;
pub(crate) mod transactions;

const SQLITE_DB_URL: &str = "sqlite://data/commission_store.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("CMS_DATABASE_URL").unwrap_or_else(|_| {
        info!("🪛 CMS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🪛 Using database URL: {result}");
    result
}

/// Creates a connection pool in WAL journal mode, so that readers never block the writer, with a busy timeout so that
/// competing writers wait for the write lock instead of failing immediately.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;
    debug!("🧾 Connected to {url} with up to {max_connections} connections");
    Ok(pool)
}
