//! Collaborator interfaces and their implementations
//!
//! The engines depend only on the traits defined here:
//!
//! - `TransactionSource`: transactions of an account since a watermark
//! - `AccountDirectory`: a user's accounts and bank-side cashbacks
//! - `Categorizer`: description to spending category
//! - `Recommender`: ranked cashback candidates for an account
//!
//! Implementations: `BankApiClient` (HTTP bank network), `CsvTransactionSource`
//! (offline replay), `RuleCategorizer`, `HttpCategorizer`, and the in-process
//! mocks in `mock`.
//!
//! Every call made by an engine goes through [`with_timeout`].

mod bank_api;
mod categorizer;
mod csv_source;
pub mod mock;

pub use bank_api::BankApiClient;
pub use categorizer::{HttpCategorizer, RuleCategorizer};
pub use csv_source::CsvTransactionSource;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AppConfig, CategorizerBackend};
use crate::error::{Error, Result};
use crate::models::{CashbackOffer, NewTransaction};

/// Failure reported by a collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Not enough classified history to rank categories
    #[error("insufficient history")]
    InsufficientHistory,
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// A transaction as delivered by the bank network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalTransaction {
    /// Bank-assigned transaction id
    pub id: String,
    #[serde(alias = "name")]
    pub description: String,
    #[serde(alias = "value")]
    pub amount: i64,
    pub time: DateTime<Utc>,
}

impl ExternalTransaction {
    /// Convert to the stored shape with the category assigned by the categorizer
    pub fn into_new(self, category: Option<String>) -> NewTransaction {
        NewTransaction {
            bank_id: self.id,
            description: self.description,
            amount: self.amount,
            time: self.time,
            category,
        }
    }
}

/// An account as reported by the account directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalAccount {
    pub number: String,
    pub bank: String,
    #[serde(default)]
    pub cards: Vec<ExternalCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalCard {
    pub card_number: String,
}

/// Supplies transactions for an account
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Transactions strictly after `since` (all of them when `None`)
    async fn fetch(
        &self,
        account_number: &str,
        since: Option<DateTime<Utc>>,
    ) -> CollaboratorResult<Vec<ExternalTransaction>>;
}

/// Knows which accounts a user holds and what the bank already committed
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn accounts(&self, user_external_id: &str) -> CollaboratorResult<Vec<ExternalAccount>>;

    async fn committed_cashbacks(
        &self,
        account_number: &str,
        month: NaiveDate,
    ) -> CollaboratorResult<Vec<CashbackOffer>>;
}

/// Maps transaction descriptions to spending categories
#[async_trait]
pub trait Categorizer: Send + Sync {
    /// One category per description, same length and order as the input
    async fn classify(&self, descriptions: &[String]) -> CollaboratorResult<Vec<String>>;
}

/// Ranks cashback candidates for an account
#[async_trait]
pub trait Recommender: Send + Sync {
    /// Ordered best first, at most the configured number of entries
    async fn rank(&self, account_id: i64) -> CollaboratorResult<Vec<CashbackOffer>>;
}

/// Run a collaborator call with an upper bound on its duration
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}

/// Build the categorizer selected in the config
pub fn categorizer_from_config(config: &AppConfig) -> Result<Arc<dyn Categorizer>> {
    let c = &config.categorizer;
    match c.backend {
        CategorizerBackend::Rules => Ok(Arc::new(RuleCategorizer::from_config(c)?)),
        CategorizerBackend::Http => {
            let host = c.host.as_deref().ok_or_else(|| {
                Error::Config("categorizer.backend = \"http\" requires categorizer.host".into())
            })?;
            Ok(Arc::new(HttpCategorizer::new(host)))
        }
    }
}

/// Build the bank network client if a base URL is configured
pub fn bank_client_from_config(config: &AppConfig) -> Option<Arc<BankApiClient>> {
    config
        .bank_api
        .base_url
        .as_deref()
        .map(|url| Arc::new(BankApiClient::new(url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, CollaboratorError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: CollaboratorResult<()> = with_timeout(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(CollaboratorError::Timeout(Duration::from_millis(20))));
    }

    #[test]
    fn test_external_transaction_accepts_bank_field_names() {
        let json = r#"{"id":"TX1","name":"Coffee","value":-250,"time":"2024-03-02T10:00:00Z"}"#;
        let tx: ExternalTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.description, "Coffee");
        assert_eq!(tx.amount, -250);

        let new = tx.into_new(Some("drinks".to_string()));
        assert_eq!(new.bank_id, "TX1");
        assert_eq!(new.category.as_deref(), Some("drinks"));
    }

    #[test]
    fn test_http_backend_requires_host() {
        let mut config = AppConfig::embedded().unwrap();
        config.categorizer.backend = CategorizerBackend::Http;
        config.categorizer.host = None;
        assert!(matches!(
            categorizer_from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
