//! Domain models for Cashbacker
//!
//! One canonical type per stored entity. Shapes coming from the bank network
//! live in `external` and are converted into these at the boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A person whose bank accounts are tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Identifier assigned by the identity provider
    pub external_id: String,
    pub first_name: String,
    pub surname: String,
    pub created_at: DateTime<Utc>,
}

/// A user observed for the first time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub external_id: String,
    pub first_name: String,
    pub surname: String,
}

/// One bank relationship belonging to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Globally unique external account number
    pub number: String,
    pub bank: String,
    pub user_id: i64,
    /// Timestamp of the newest transaction already ingested (sync watermark)
    pub last_tx_time: Option<DateTime<Utc>>,
    /// When a sync was last attempted, successful or not
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A payment card issued on an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub card_number: String,
    pub account_id: i64,
}

impl Card {
    /// Last four characters of the card number, or the whole number if shorter
    pub fn last_four_digits(&self) -> &str {
        let start = self
            .card_number
            .char_indices()
            .rev()
            .nth(3)
            .map_or(0, |(i, _)| i);
        &self.card_number[start..]
    }
}

/// A named spending category (e.g. "groceries")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CashbackCategory {
    pub id: i64,
    pub product_type: String,
}

/// A category paired with a cashback percentage
///
/// This is what the recommender produces, what callers see in a proposal,
/// and what they send back when choosing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CashbackOffer {
    pub product_type: String,
    pub value: i64,
}

impl CashbackOffer {
    pub fn new(product_type: impl Into<String>, value: i64) -> Self {
        Self {
            product_type: product_type.into(),
            value,
        }
    }
}

/// A proposed or committed cashback for one account, category and month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCashback {
    pub id: i64,
    pub account_id: i64,
    pub category_id: i64,
    pub product_type: String,
    /// Always the first day of the month
    pub month: NaiveDate,
    pub value: i64,
    pub committed: bool,
}

impl UserCashback {
    pub fn offer(&self) -> CashbackOffer {
        CashbackOffer::new(self.product_type.clone(), self.value)
    }
}

/// Allocation state of an (account, month) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthState {
    /// No rows for the month
    NoCashback,
    /// Only uncommitted rows
    Proposed,
    /// At least one committed row (terminal for the month)
    Committed,
}

impl MonthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCashback => "no_cashback",
            Self::Proposed => "proposed",
            Self::Committed => "committed",
        }
    }

    /// Derive the state from the rows stored for one account and month
    pub fn from_rows(rows: &[UserCashback]) -> Self {
        if rows.iter().any(|r| r.committed) {
            Self::Committed
        } else if rows.is_empty() {
            Self::NoCashback
        } else {
            Self::Proposed
        }
    }
}

impl std::fmt::Display for MonthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// All cashback rows of an account for a month, with the derived state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthCashbacks {
    pub account_id: i64,
    pub month: NaiveDate,
    pub state: MonthState,
    pub cashbacks: Vec<UserCashback>,
}

/// Result of a proposal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub account_id: i64,
    pub account_number: String,
    pub bank: String,
    pub month: NaiveDate,
    pub cashbacks: Vec<CashbackOffer>,
    pub can_choose_cashback: bool,
    /// False when an earlier proposal was returned instead of a new one
    pub created: bool,
}

/// A stored ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Transaction id assigned by the bank; unique across the ledger
    pub bank_id: String,
    pub account_id: i64,
    pub description: String,
    /// Signed amount in whole currency units; negative is an outflow
    pub amount: i64,
    pub time: DateTime<Utc>,
    pub category: Option<String>,
}

/// A transaction ready to be inserted
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub bank_id: String,
    pub description: String,
    pub amount: i64,
    pub time: DateTime<Utc>,
    pub category: Option<String>,
}

/// Outcome of one sync run for an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncResult {
    pub account_id: i64,
    pub transactions_added: usize,
    /// Delivered transactions that were already stored
    pub duplicates_skipped: usize,
    /// True when the cool-down window short-circuited the run
    pub throttled: bool,
    /// Watermark after the run
    pub watermark: Option<DateTime<Utc>>,
}

impl SyncResult {
    pub fn throttled(account: &Account) -> Self {
        Self {
            account_id: account.id,
            transactions_added: 0,
            duplicates_skipped: 0,
            throttled: true,
            watermark: account.last_tx_time,
        }
    }
}

/// Per-account entry of a multi-account sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSyncOutcome {
    pub account_id: i64,
    pub account_number: String,
    pub result: Option<SyncResult>,
    pub error: Option<String>,
}

impl AccountSyncOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Account summary shown to the account owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOverview {
    pub account_id: i64,
    pub account_number: String,
    pub bank: String,
    pub can_choose_cashback: bool,
    /// Committed cashbacks for the requested month
    pub cashbacks: Vec<CashbackOffer>,
    /// Last four digits of each card
    pub cards: Vec<String>,
}

/// Transactions of one account for a month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTransactions {
    pub account_id: i64,
    pub account_number: String,
    pub bank: String,
    pub transactions: Vec<Transaction>,
}

/// Spending per category, used to rank cashback candidates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategorySpending {
    pub category: String,
    pub transaction_count: i64,
    /// Sum of outflows as a positive number
    pub total_spent: i64,
}

/// Monthly spending limit for a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryLimit {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub value: i64,
}

/// Spending against a limit for one month
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitStatus {
    pub category: String,
    pub limit: i64,
    pub spent: i64,
    /// Negative when the limit is exceeded
    pub remaining: i64,
}

impl LimitStatus {
    pub fn is_exceeded(&self) -> bool {
        self.remaining < 0
    }
}
