//! Ledger store with connection pooling and schema setup
//!
//! This module is organized by domain:
//! - `users` - User records
//! - `accounts` - Accounts, cards, sync watermark and throttle slot
//! - `transactions` - Deduplicated transaction ingestion and spending queries
//! - `cashbacks` - Category catalog and monthly cashback rows
//! - `limits` - Per-user category spending limits
//! - `audit` - Audit log of mutating API calls

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod audit;
mod cashbacks;
mod limits;
mod transactions;
mod users;

pub use accounts::SyncClaim;
pub use audit::AuditEntry;
pub use cashbacks::ProposalInsert;
pub use transactions::StoreResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CASHBACKER_DB_KEY";

/// Pragmas applied to every pooled connection
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"cashbacker-salt1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Format a timestamp for storage
///
/// Fixed width with microseconds so that text order equals time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a stored timestamp column
pub(crate) fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable stored timestamp column
pub(crate) fn opt_timestamp_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        parse_timestamp(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn format_month(month: NaiveDate) -> String {
    crate::month::normalize(month).format("%Y-%m-%d").to_string()
}

pub(crate) fn month_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Whether an error is a UNIQUE/foreign key constraint failure
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires the `CASHBACKER_DB_KEY` environment variable. Use
    /// `new_unencrypted()` for development and tests.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let mut init_sql = String::new();
        if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            // The key must be the first statement on a SQLCipher connection
            init_sql.push_str(&format!("PRAGMA key = 'x\"{}\"';", key));
        }
        init_sql.push_str(CONNECTION_PRAGMAS);

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so that every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "cashbacker_test_{}_{}.db",
            std::process::id(),
            id
        ));

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Seed the category catalog
    pub fn seed_categories(&self, names: &[String]) -> Result<usize> {
        let mut created = 0;
        for name in names {
            let before = self.get_category(name)?;
            self.ensure_category(name)?;
            if before.is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the sync writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL DEFAULT '',
                surname TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                number TEXT NOT NULL UNIQUE,
                bank TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_tx_time TEXT,                      -- sync watermark
                last_sync_attempt TEXT,                 -- throttle slot
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            CREATE TABLE IF NOT EXISTS cards (
                id INTEGER PRIMARY KEY,
                card_number TEXT NOT NULL UNIQUE,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_cards_account ON cards(account_id);

            CREATE TABLE IF NOT EXISTS cashback_categories (
                id INTEGER PRIMARY KEY,
                product_type TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS user_cashbacks (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES cashback_categories(id),
                month TEXT NOT NULL,                    -- YYYY-MM-01
                value INTEGER NOT NULL,
                committed BOOLEAN NOT NULL DEFAULT 0,
                UNIQUE(account_id, category_id, month)
            );

            CREATE INDEX IF NOT EXISTS idx_user_cashbacks_month ON user_cashbacks(account_id, month);

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                bank_id TEXT NOT NULL UNIQUE,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                description TEXT NOT NULL,
                amount INTEGER NOT NULL,                -- negative is an outflow
                time TEXT NOT NULL,
                category TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_account_time ON transactions(account_id, time);
            CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category);

            CREATE TABLE IF NOT EXISTS category_limits (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                category TEXT NOT NULL,
                value INTEGER NOT NULL,
                UNIQUE(user_id, category)
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
