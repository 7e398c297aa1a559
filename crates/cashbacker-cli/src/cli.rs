//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cashbacker - transaction sync and monthly cashback allocation
#[derive(Parser)]
#[command(name = "cashbacker")]
#[command(about = "Bank transaction sync and monthly cashback allocation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "cashbacker.db", global = true)]
    pub db: PathBuf,

    /// Configuration file (defaults to CASHBACKER_CONFIG, then the data dir, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CASHBACKER_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed the category catalog
    Init,

    /// Register a user and discover their accounts through the bank API
    Register {
        /// Identifier assigned by the identity provider
        external_id: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        surname: String,

        /// Month whose bank-side cashbacks are imported (YYYY-MM, default: current)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Add an account to a user by hand
    AddAccount {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Account number
        number: String,

        /// Bank name
        #[arg(short, long)]
        bank: String,

        /// Card number (repeatable)
        #[arg(long = "card")]
        cards: Vec<String>,
    },

    /// List accounts (all, or one user's with committed cashbacks)
    Accounts {
        /// Show only this user's accounts
        #[arg(short, long)]
        user: Option<i64>,

        /// Month for the cashback column (YYYY-MM, default: current)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Pull new transactions (one account, one user, or everything)
    Sync {
        #[arg(short, long, conflicts_with = "user")]
        account: Option<i64>,

        #[arg(short, long)]
        user: Option<i64>,

        /// Read transactions from a CSV file instead of the bank API
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Propose, choose, show or reset monthly cashback
    Cashback {
        #[command(subcommand)]
        action: CashbackAction,
    },

    /// Show stored transactions
    Transactions {
        /// Account to list (newest first)
        #[arg(short, long, conflicts_with = "user")]
        account: Option<i64>,

        /// User whose transactions for --month are listed
        #[arg(short, long)]
        user: Option<i64>,

        /// Month for --user (YYYY-MM, default: current)
        #[arg(short, long)]
        month: Option<String>,

        /// Maximum number of transactions for --account
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Manage monthly spending limits
    Limits {
        #[command(subcommand)]
        action: LimitsAction,
    },

    /// List the category catalog
    Categories,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an API key from CASHBACKER_API_KEYS.
        #[arg(long)]
        no_auth: bool,

        /// Read transactions from a CSV file instead of the bank API
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CashbackAction {
    /// Propose cashback categories for a month
    Propose {
        /// Account ID
        account: i64,

        /// Month (YYYY-MM, default: current)
        #[arg(short, long)]
        month: Option<String>,

        /// Skip syncing transactions first
        #[arg(long)]
        no_sync: bool,

        /// Read transactions from a CSV file instead of the bank API
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Choose from the proposal, e.g. --pick groceries:10 --pick clothing:7
    Choose {
        /// Account ID
        account: i64,

        /// Month (YYYY-MM)
        #[arg(short, long)]
        month: String,

        /// category:percent pair (repeatable)
        #[arg(long = "pick", required = true)]
        picks: Vec<String>,
    },

    /// Show the month state and rows
    Show {
        /// Account ID
        account: i64,

        /// Month (YYYY-MM, default: current)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Delete every cashback row of an account
    Reset {
        /// Account ID
        account: i64,

        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum LimitsAction {
    /// Set (or overwrite) a category limit
    Set {
        #[arg(short, long)]
        user: i64,
        category: String,
        value: i64,
    },

    /// List a user's limits
    List {
        #[arg(short, long)]
        user: i64,
    },

    /// Remove a category limit
    Remove {
        #[arg(short, long)]
        user: i64,
        category: String,
    },

    /// Spending against each limit for a month
    Report {
        #[arg(short, long)]
        user: i64,

        /// Month (YYYY-MM, default: current)
        #[arg(short, long)]
        month: Option<String>,
    },
}
