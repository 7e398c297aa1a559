//! Sync and allocation wired together

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::cashback::CashbackAllocator;
use crate::config::AppConfig;
use crate::db::Database;
use crate::error::Result;
use crate::external::{categorizer_from_config, Categorizer, Recommender, TransactionSource};
use crate::models::{MonthCashbacks, Proposal, SyncResult};
use crate::recommender::SpendingRecommender;
use crate::sync::SyncPipeline;

/// Result of a "sync and propose" request
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncAndPropose {
    pub sync: SyncResult,
    pub proposal: Proposal,
}

pub struct CashbackEngine {
    sync: SyncPipeline,
    allocator: CashbackAllocator,
}

impl CashbackEngine {
    pub fn new(sync: SyncPipeline, allocator: CashbackAllocator) -> Self {
        Self { sync, allocator }
    }

    /// Assemble an engine from explicit collaborators
    pub fn with_collaborators(
        db: Database,
        config: &AppConfig,
        source: Arc<dyn TransactionSource>,
        categorizer: Arc<dyn Categorizer>,
        recommender: Arc<dyn Recommender>,
    ) -> Self {
        Self::new(
            SyncPipeline::new(db.clone(), source, categorizer, config.sync.clone()),
            CashbackAllocator::new(db, recommender, config.cashback.clone()),
        )
    }

    /// Assemble an engine with the configured categorizer and the spending recommender
    pub fn from_config(
        db: Database,
        config: &AppConfig,
        source: Arc<dyn TransactionSource>,
    ) -> Result<Self> {
        let categorizer = categorizer_from_config(config)?;
        let recommender = Arc::new(SpendingRecommender::from_config(db.clone(), config));
        Ok(Self::with_collaborators(
            db,
            config,
            source,
            categorizer,
            recommender,
        ))
    }

    pub fn sync_pipeline(&self) -> &SyncPipeline {
        &self.sync
    }

    pub fn allocator(&self) -> &CashbackAllocator {
        &self.allocator
    }

    /// Refresh transactions, then propose cashback for the month
    ///
    /// A failed sync aborts the call; no proposal is made from stale data.
    pub async fn sync_and_propose(&self, account_id: i64, month: NaiveDate) -> Result<SyncAndPropose> {
        let sync = self.sync.sync(account_id).await?;
        debug!(account_id, added = sync.transactions_added, "Sync done, proposing");
        let proposal = self.allocator.propose(account_id, month).await?;
        Ok(SyncAndPropose { sync, proposal })
    }

    pub async fn sync(&self, account_id: i64) -> Result<SyncResult> {
        self.sync.sync(account_id).await
    }

    pub async fn propose(&self, account_id: i64, month: NaiveDate) -> Result<Proposal> {
        self.allocator.propose(account_id, month).await
    }

    pub fn choose(
        &self,
        account_id: i64,
        month: NaiveDate,
        selections: &[crate::models::CashbackOffer],
    ) -> Result<MonthCashbacks> {
        self.allocator.choose(account_id, month, selections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::external::mock::{MockBank, MockCategorizer};
    use crate::models::NewUser;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_sync_and_propose_uses_fresh_history() {
        let db = Database::in_memory().unwrap();
        let config = AppConfig::embedded().unwrap();
        let user_id = db
            .upsert_user(&NewUser {
                external_id: "u".to_string(),
                first_name: String::new(),
                surname: String::new(),
            })
            .unwrap();
        let account_id = db.upsert_account("111", "center-invest", user_id).unwrap();

        let bank = Arc::new(MockBank::new());
        let now = Utc::now();
        for i in 0..3 {
            bank.push("111", &format!("B{}", i), "Bread", -100, now - Duration::days(i + 1));
        }
        bank.push("111", "C1", "Coffee", -50, now - Duration::days(2));

        let recommender = Arc::new(SpendingRecommender::from_config(db.clone(), &config));
        let engine = CashbackEngine::with_collaborators(
            db,
            &config,
            bank.clone(),
            Arc::new(MockCategorizer::default()),
            recommender,
        );

        let month = crate::month::current(now);
        let result = engine.sync_and_propose(account_id, month).await.unwrap();
        assert_eq!(result.sync.transactions_added, 4);
        assert!(result.proposal.created);
        assert_eq!(result.proposal.cashbacks[0].product_type, "groceries");
        assert_eq!(result.proposal.cashbacks[0].value, 10);
        assert_eq!(result.proposal.cashbacks[1].product_type, "drinks");
        assert_eq!(result.proposal.cashbacks[1].value, 3);
    }

    #[tokio::test]
    async fn test_sync_failure_blocks_proposal() {
        let db = Database::in_memory().unwrap();
        let config = AppConfig::embedded().unwrap();
        let user_id = db
            .upsert_user(&NewUser {
                external_id: "u".to_string(),
                first_name: String::new(),
                surname: String::new(),
            })
            .unwrap();
        let account_id = db.upsert_account("111", "center-invest", user_id).unwrap();

        let bank = Arc::new(MockBank::new());
        bank.set_failing(true);
        let recommender = Arc::new(crate::external::mock::MockRecommender::new(vec![]));
        let engine = CashbackEngine::with_collaborators(
            db,
            &config,
            bank,
            Arc::new(MockCategorizer::default()),
            recommender.clone(),
        );

        let err = engine
            .sync_and_propose(account_id, crate::month::current(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert_eq!(recommender.calls(), 0);
    }
}
