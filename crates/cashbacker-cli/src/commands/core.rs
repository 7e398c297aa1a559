//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` / `load_config` - Shared setup used by every command
//! - Collaborator wiring (transaction source, account directory, engine)
//! - `cmd_init` - Initialize the database

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use tracing::debug;

use cashbacker_core::external::{bank_client_from_config, AccountDirectory, TransactionSource};
use cashbacker_core::{
    month, AppConfig, CashbackAllocator, CashbackEngine, CsvTransactionSource, Database,
    SpendingRecommender,
};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(path).context("Failed to load configuration")
}

/// Parse a `YYYY-MM` argument, defaulting to the current month
pub fn resolve_month(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(s) => Ok(month::parse(s)?),
        None => Ok(month::current(Utc::now())),
    }
}

/// Transaction source: the CSV file if given, otherwise the configured bank API
pub fn transaction_source(
    config: &AppConfig,
    csv: Option<&Path>,
) -> Result<Arc<dyn TransactionSource>> {
    if let Some(path) = csv {
        let source = CsvTransactionSource::from_path(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!(rows = source.len(), "Using CSV transaction source");
        return Ok(Arc::new(source));
    }

    match bank_client_from_config(config) {
        Some(client) => Ok(client as Arc<dyn TransactionSource>),
        None => bail!(
            "No transaction source: set bank_api.base_url (or CASHBACKER_BANK_API_URL), or pass --csv"
        ),
    }
}

pub fn account_directory(config: &AppConfig) -> Option<Arc<dyn AccountDirectory>> {
    bank_client_from_config(config).map(|c| c as Arc<dyn AccountDirectory>)
}

pub fn build_engine(db: &Database, config: &AppConfig, csv: Option<&Path>) -> Result<CashbackEngine> {
    let source = transaction_source(config, csv)?;
    CashbackEngine::from_config(db.clone(), config, source).context("Failed to set up the engine")
}

/// Allocator backed by the spending recommender; needs no transaction source
pub fn build_allocator(db: &Database, config: &AppConfig) -> CashbackAllocator {
    CashbackAllocator::new(
        db.clone(),
        Arc::new(SpendingRecommender::from_config(db.clone(), config)),
        config.cashback.clone(),
    )
}

pub fn cmd_init(db_path: &Path, config: &AppConfig, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    let seeded = db
        .seed_categories(&config.categories.catalog)
        .context("Failed to seed categories")?;
    println!("   Seeded {} categories", seeded);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Register a user: cashbacker register <external-id>");
    println!("  2. Sync transactions: cashbacker sync --user <id>");
    println!("  3. Propose cashback: cashbacker cashback propose <account-id>");

    Ok(())
}
