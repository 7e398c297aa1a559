//! HTTP client for the bank network
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `POST /transactions` `{account_number, start_datetime}` → `{transactions: [...]}`
//! - `GET /accounts?user_id=` → `[{number, bank, cards: [{card_number}]}]`
//! - `POST /cashbacks` `{account_number, month}` → `{cashbacks: [{product_type, value}]}`
//!
//! Transport errors and non-2xx responses are reported as `Unavailable`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    AccountDirectory, CollaboratorError, CollaboratorResult, ExternalAccount, ExternalTransaction,
    TransactionSource,
};
use crate::models::CashbackOffer;

#[derive(Clone)]
pub struct BankApiClient {
    http_client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct TransactionsRequest<'a> {
    account_number: &'a str,
    start_datetime: Option<String>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<ExternalTransaction>,
}

#[derive(Serialize)]
struct CashbacksRequest<'a> {
    account_number: &'a str,
    month: String,
}

#[derive(Deserialize)]
struct CashbacksResponse {
    #[serde(default)]
    cashbacks: Vec<CashbackOffer>,
}

impl BankApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> CollaboratorResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(CollaboratorError::Unavailable(format!(
                "bank API returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )))
        }
    }
}

#[async_trait]
impl TransactionSource for BankApiClient {
    async fn fetch(
        &self,
        account_number: &str,
        since: Option<DateTime<Utc>>,
    ) -> CollaboratorResult<Vec<ExternalTransaction>> {
        let request = TransactionsRequest {
            account_number,
            start_datetime: since.map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        };

        let response = self
            .http_client
            .post(self.url("transactions"))
            .json(&request)
            .send()
            .await?;
        let body: TransactionsResponse = Self::check(response).await?.json().await?;

        // The bank treats the bound as inclusive; the watermark row itself is not new
        let transactions: Vec<_> = body
            .transactions
            .into_iter()
            .filter(|t| since.map_or(true, |s| t.time > s))
            .collect();

        debug!(account = account_number, count = transactions.len(), "Fetched transactions");
        Ok(transactions)
    }
}

#[async_trait]
impl AccountDirectory for BankApiClient {
    async fn accounts(&self, user_external_id: &str) -> CollaboratorResult<Vec<ExternalAccount>> {
        let response = self
            .http_client
            .get(self.url("accounts"))
            .query(&[("user_id", user_external_id)])
            .send()
            .await?;
        let accounts: Vec<ExternalAccount> = Self::check(response).await?.json().await?;
        Ok(accounts)
    }

    async fn committed_cashbacks(
        &self,
        account_number: &str,
        month: NaiveDate,
    ) -> CollaboratorResult<Vec<CashbackOffer>> {
        let request = CashbacksRequest {
            account_number,
            month: crate::month::normalize(month).format("%Y-%m-%d").to_string(),
        };
        let response = self
            .http_client
            .post(self.url("cashbacks"))
            .json(&request)
            .send()
            .await?;
        let body: CashbacksResponse = Self::check(response).await?.json().await?;
        Ok(body.cashbacks)
    }
}
