//! Transaction sync pipeline
//!
//! One run for an account:
//!
//! 1. Take the account's sync slot; inside the cool-down window the run is
//!    throttled and the source is never contacted.
//! 2. Fetch everything after the watermark from the transaction source.
//! 3. Classify each unique description once, in batches.
//! 4. Store the batch and advance the watermark in one database transaction;
//!    already-known bank ids are skipped.
//!
//! If the source or categorizer fails (or times out) the slot is given back
//! and nothing else is written, so the caller can retry immediately.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::db::{Database, SyncClaim};
use crate::error::{Error, Result};
use crate::external::{with_timeout, Categorizer, ExternalTransaction, TransactionSource};
use crate::models::{Account, AccountSyncOutcome, SyncResult};

#[derive(Clone)]
pub struct SyncPipeline {
    db: Database,
    source: Arc<dyn TransactionSource>,
    categorizer: Arc<dyn Categorizer>,
    config: SyncConfig,
}

impl SyncPipeline {
    pub fn new(
        db: Database,
        source: Arc<dyn TransactionSource>,
        categorizer: Arc<dyn Categorizer>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            source,
            categorizer,
            config,
        }
    }

    /// Sync one account now
    pub async fn sync(&self, account_id: i64) -> Result<SyncResult> {
        self.sync_at(account_id, Utc::now()).await
    }

    /// Sync one account as of `now`
    pub async fn sync_at(&self, account_id: i64, now: DateTime<Utc>) -> Result<SyncResult> {
        let account = self.db.require_account(account_id)?;

        let previous = match self
            .db
            .claim_sync_attempt(account_id, now, self.config.cooldown())?
        {
            SyncClaim::Throttled => {
                debug!(account_id, "Sync throttled");
                return Ok(SyncResult::throttled(&account));
            }
            SyncClaim::Claimed { previous } => previous,
        };

        match self.fetch_and_store(&account).await {
            Ok(result) => {
                info!(
                    account_id,
                    added = result.transactions_added,
                    skipped = result.duplicates_skipped,
                    "Sync complete"
                );
                Ok(result)
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(account_id, error = %e, "Sync failed, releasing attempt");
                    if let Err(release_err) =
                        self.db.release_sync_attempt(account_id, now, previous)
                    {
                        warn!(account_id, error = %release_err, "Failed to release sync attempt");
                    }
                }
                Err(e)
            }
        }
    }

    async fn fetch_and_store(&self, account: &Account) -> Result<SyncResult> {
        let fetched = with_timeout(
            self.config.timeout(),
            self.source.fetch(&account.number, account.last_tx_time),
        )
        .await
        .map_err(|e| Error::SourceUnavailable(e.to_string()))?;

        if fetched.is_empty() {
            return Ok(SyncResult {
                account_id: account.id,
                transactions_added: 0,
                duplicates_skipped: 0,
                throttled: false,
                watermark: account.last_tx_time,
            });
        }

        let categories = self.classify(&fetched).await?;
        let batch: Vec<_> = fetched
            .into_iter()
            .map(|t| {
                let category = categories.get(&t.description).cloned();
                t.into_new(category)
            })
            .collect();

        let stored = self.db.store_synced_transactions(account.id, &batch)?;

        Ok(SyncResult {
            account_id: account.id,
            transactions_added: stored.inserted,
            duplicates_skipped: stored.duplicates,
            throttled: false,
            watermark: stored.watermark,
        })
    }

    /// Category per unique description
    async fn classify(&self, transactions: &[ExternalTransaction]) -> Result<HashMap<String, String>> {
        let mut unique: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for t in transactions {
            if seen.insert(t.description.as_str()) {
                unique.push(t.description.clone());
            }
        }

        let mut categories = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(self.config.classify_batch_size.max(1)) {
            let result = with_timeout(self.config.timeout(), self.categorizer.classify(chunk))
                .await
                .map_err(|e| Error::CategorizerUnavailable(e.to_string()))?;

            if result.len() != chunk.len() {
                return Err(Error::CategorizerUnavailable(format!(
                    "got {} categories for {} descriptions",
                    result.len(),
                    chunk.len()
                )));
            }

            for (description, category) in chunk.iter().zip(result) {
                let category = category.trim().to_lowercase();
                if !category.is_empty() {
                    categories.insert(description.clone(), category);
                }
            }
        }

        Ok(categories)
    }

    /// Sync every account of a user; one account failing does not stop the rest
    pub async fn sync_user(&self, user_id: i64) -> Result<Vec<AccountSyncOutcome>> {
        if self.db.get_user(user_id)?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        let accounts = self.db.list_user_accounts(user_id)?;
        Ok(self.sync_accounts(accounts).await)
    }

    /// Sync every known account
    pub async fn sync_all(&self) -> Result<Vec<AccountSyncOutcome>> {
        let accounts = self.db.list_accounts()?;
        Ok(self.sync_accounts(accounts).await)
    }

    async fn sync_accounts(&self, accounts: Vec<Account>) -> Vec<AccountSyncOutcome> {
        let mut outcomes = Vec::with_capacity(accounts.len());
        for account in accounts {
            let outcome = match self.sync(account.id).await {
                Ok(result) => AccountSyncOutcome {
                    account_id: account.id,
                    account_number: account.number,
                    result: Some(result),
                    error: None,
                },
                Err(e) => AccountSyncOutcome {
                    account_id: account.id,
                    account_number: account.number,
                    result: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::{MockBank, MockCategorizer};
    use crate::models::NewUser;
    use chrono::{Duration, TimeZone};

    const NUMBER: &str = "40817810000000000123";

    struct Fixture {
        db: Database,
        bank: Arc<MockBank>,
        categorizer: Arc<MockCategorizer>,
        pipeline: SyncPipeline,
        account_id: i64,
    }

    fn fixture(config: SyncConfig) -> Fixture {
        let db = Database::in_memory().unwrap();
        let user_id = db
            .upsert_user(&NewUser {
                external_id: "u-1".to_string(),
                first_name: String::new(),
                surname: String::new(),
            })
            .unwrap();
        let account_id = db.upsert_account(NUMBER, "center-invest", user_id).unwrap();
        let bank = Arc::new(MockBank::new());
        let categorizer = Arc::new(MockCategorizer::default());
        let pipeline = SyncPipeline::new(db.clone(), bank.clone(), categorizer.clone(), config);
        Fixture {
            db,
            bank,
            categorizer,
            pipeline,
            account_id,
        }
    }

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_first_sync_classifies_and_stores() {
        let f = fixture(SyncConfig::default());
        f.bank.push(NUMBER, "TX1", "Fresh bread", -120, t(1, 9));
        f.bank.push(NUMBER, "TX2", "Coffee", -250, t(2, 9));

        let result = f.pipeline.sync_at(f.account_id, t(3, 0)).await.unwrap();
        assert_eq!(result.transactions_added, 2);
        assert!(!result.throttled);
        assert_eq!(result.watermark, Some(t(2, 9)));

        let stored = f.db.list_account_transactions(f.account_id, 10).unwrap();
        assert_eq!(stored[0].category.as_deref(), Some("drinks"));
        assert_eq!(stored[1].category.as_deref(), Some("groceries"));
    }

    #[tokio::test]
    async fn test_unique_descriptions_classified_once_in_batches() {
        let f = fixture(SyncConfig {
            classify_batch_size: 2,
            ..Default::default()
        });
        f.bank.push(NUMBER, "TX1", "Coffee", -1, t(1, 1));
        f.bank.push(NUMBER, "TX2", "Coffee", -1, t(1, 2));
        f.bank.push(NUMBER, "TX3", "Bread", -1, t(1, 3));
        f.bank.push(NUMBER, "TX4", "Jeans", -1, t(1, 4));

        f.pipeline.sync_at(f.account_id, t(2, 0)).await.unwrap();
        let batches = f.categorizer.batches();
        assert_eq!(
            batches,
            vec![
                vec!["Coffee".to_string(), "Bread".to_string()],
                vec!["Jeans".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_throttle_skips_source() {
        let f = fixture(SyncConfig::default());
        f.bank.push(NUMBER, "TX1", "Coffee", -1, t(1, 1));

        f.pipeline.sync_at(f.account_id, t(2, 10)).await.unwrap();
        f.bank.push(NUMBER, "TX2", "Bread", -1, t(2, 9));

        let second = f
            .pipeline
            .sync_at(f.account_id, t(2, 10) + Duration::minutes(10))
            .await
            .unwrap();
        assert!(second.throttled);
        assert_eq!(second.transactions_added, 0);
        assert_eq!(f.bank.fetch_calls(), 1);

        let third = f
            .pipeline
            .sync_at(f.account_id, t(2, 10) + Duration::minutes(31))
            .await
            .unwrap();
        assert_eq!(third.transactions_added, 1);
        assert_eq!(f.bank.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_sync_records_attempt() {
        let f = fixture(SyncConfig::default());
        let result = f.pipeline.sync_at(f.account_id, t(5, 0)).await.unwrap();
        assert_eq!(result.transactions_added, 0);
        assert!(result.watermark.is_none());

        let account = f.db.get_account(f.account_id).unwrap().unwrap();
        assert_eq!(account.last_sync_attempt, Some(t(5, 0)));
        assert_eq!(f.categorizer.calls(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_leaves_state_unchanged() {
        let f = fixture(SyncConfig::default());
        f.bank.push(NUMBER, "TX1", "Coffee", -1, t(1, 1));
        f.bank.set_failing(true);

        let err = f.pipeline.sync_at(f.account_id, t(2, 0)).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));

        let account = f.db.get_account(f.account_id).unwrap().unwrap();
        assert!(account.last_tx_time.is_none());
        assert!(account.last_sync_attempt.is_none());

        // Immediate retry is not throttled
        f.bank.set_failing(false);
        let result = f.pipeline.sync_at(f.account_id, t(2, 0)).await.unwrap();
        assert_eq!(result.transactions_added, 1);
    }

    #[tokio::test]
    async fn test_categorizer_failure_stores_nothing() {
        let f = fixture(SyncConfig::default());
        f.bank.push(NUMBER, "TX1", "Coffee", -1, t(1, 1));
        f.categorizer.set_failing(true);

        let err = f.pipeline.sync_at(f.account_id, t(2, 0)).await.unwrap_err();
        assert!(matches!(err, Error::CategorizerUnavailable(_)));
        assert!(err.is_transient());
        assert_eq!(f.db.count_account_transactions(f.account_id).unwrap(), 0);
        let account = f.db.get_account(f.account_id).unwrap().unwrap();
        assert!(account.last_tx_time.is_none());
    }

    #[tokio::test]
    async fn test_source_timeout_is_unavailable() {
        let f = fixture(SyncConfig {
            timeout_secs: 0,
            ..Default::default()
        });
        f.bank.set_delay(Some(std::time::Duration::from_millis(200)));

        let err = f.pipeline.sync_at(f.account_id, t(2, 0)).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        let account = f.db.get_account(f.account_id).unwrap().unwrap();
        assert!(account.last_sync_attempt.is_none());
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let f = fixture(SyncConfig::default());
        let err = f.pipeline.sync(9999).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
        assert_eq!(f.bank.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_user_reports_each_account() {
        let f = fixture(SyncConfig::default());
        let account = f.db.get_account(f.account_id).unwrap().unwrap();
        let second = f
            .db
            .upsert_account("40817810000000000999", "other-bank", account.user_id)
            .unwrap();
        f.bank.push(NUMBER, "TX1", "Coffee", -1, t(1, 1));
        f.bank.push("40817810000000000999", "TX2", "Bread", -1, t(1, 2));

        let outcomes = f.pipeline.sync_user(account.user_id).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(outcomes[1].account_id, second);
        assert_eq!(outcomes[1].result.as_ref().unwrap().transactions_added, 1);

        assert!(matches!(
            f.pipeline.sync_user(4242).await,
            Err(Error::UserNotFound(_))
        ));
    }
}
