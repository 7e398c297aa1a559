//! Error types for Cashbacker

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Transaction source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Categorizer unavailable: {0}")]
    CategorizerUnavailable(String),

    #[error("Recommender unavailable: {0}")]
    RecommenderUnavailable(String),

    #[error("Cashback for account {account_id} already chosen for {month}")]
    CashbackAlreadyCommitted { account_id: i64, month: NaiveDate },

    #[error("Selection does not match the proposed cashbacks: {0}")]
    SelectionMismatch(String),

    #[error("Account {account_id} ({bank}) cannot choose cashback")]
    AccountNotEligible { account_id: i64, bank: String },
}

impl Error {
    /// Whether the caller may retry the same request later with no changes
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable(_)
                | Self::CategorizerUnavailable(_)
                | Self::RecommenderUnavailable(_)
                | Self::Pool(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::SourceUnavailable("down".into()).is_transient());
        assert!(Error::CategorizerUnavailable("down".into()).is_transient());
        assert!(!Error::SelectionMismatch("x".into()).is_transient());
        assert!(!Error::AccountNotFound("1".into()).is_transient());
    }

    #[test]
    fn test_already_committed_message() {
        let err = Error::CashbackAlreadyCommitted {
            account_id: 7,
            month: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Cashback for account 7 already chosen for 2024-03-01"
        );
    }
}
