//! Integration tests for cashbacker-core
//!
//! These tests exercise the sync → propose → choose workflow end to end
//! against a temp-file database and in-process collaborators.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use cashbacker_core::external::mock::{MockBank, MockCategorizer, MockRecommender};
use cashbacker_core::{
    AppConfig, CashbackAllocator, CashbackEngine, CashbackOffer, CsvTransactionSource, Database,
    Error, MonthState, NewUser, SpendingRecommender, SyncPipeline,
};

const ACCOUNT: &str = "40817810000000000123";

fn march() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn t(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn setup(db: &Database, bank: &str) -> i64 {
    let user_id = db
        .upsert_user(&NewUser {
            external_id: "user-1".to_string(),
            first_name: "Ivan".to_string(),
            surname: "Ivanov".to_string(),
        })
        .expect("Failed to create user");
    db.upsert_account(ACCOUNT, bank, user_id)
        .expect("Failed to create account")
}

fn pipeline(db: &Database, bank: Arc<MockBank>, categorizer: Arc<MockCategorizer>) -> SyncPipeline {
    let config = AppConfig::embedded().unwrap();
    SyncPipeline::new(db.clone(), bank, categorizer, config.sync)
}

// =============================================================================
// Sync Pipeline
// =============================================================================

#[tokio::test]
async fn test_redelivered_transaction_is_stored_once() {
    let db = Database::in_memory().expect("Failed to create database");
    let account_id = setup(&db, "center-invest");

    let bank = Arc::new(MockBank::new());
    bank.push(ACCOUNT, "TX1", "Bread", 500, t(5, 10));
    let sync = pipeline(&db, bank.clone(), Arc::new(MockCategorizer::default()));

    let first = sync.sync_at(account_id, t(6, 0)).await.unwrap();
    assert_eq!(first.transactions_added, 1);

    // Roll the watermark back so the bank delivers TX1 again
    db.conn()
        .unwrap()
        .execute("UPDATE accounts SET last_tx_time = NULL WHERE id = ?", [account_id])
        .unwrap();

    let second = sync.sync_at(account_id, t(7, 0)).await.unwrap();
    assert_eq!(second.transactions_added, 0);
    assert_eq!(second.duplicates_skipped, 1);

    let rows: i64 = db
        .conn()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM transactions WHERE bank_id = 'TX1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_watermark_never_moves_backwards() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");

    let bank = Arc::new(MockBank::new());
    bank.push(ACCOUNT, "A", "Bread", -100, t(3, 12));
    let categorizer = Arc::new(MockCategorizer::default());
    let sync = pipeline(&db, bank.clone(), categorizer.clone());

    let first = sync.sync_at(account_id, t(4, 0)).await.unwrap();
    assert_eq!(first.watermark, Some(t(3, 12)));

    // An older transaction shows up late; it is not behind the watermark's back
    bank.push(ACCOUNT, "B", "Milk", -50, t(2, 8));
    let second = sync.sync_at(account_id, t(5, 0)).await.unwrap();
    assert_eq!(second.transactions_added, 0);
    assert_eq!(second.watermark, Some(t(3, 12)));

    // A failing categorizer leaves the watermark and ledger untouched
    bank.push(ACCOUNT, "C", "Coffee", -30, t(6, 9));
    categorizer.set_failing(true);
    let err = sync.sync_at(account_id, t(7, 0)).await.unwrap_err();
    assert!(matches!(err, Error::CategorizerUnavailable(_)));
    assert!(err.is_transient());

    let account = db.require_account(account_id).unwrap();
    assert_eq!(account.last_tx_time, Some(t(3, 12)));
    assert_eq!(db.count_account_transactions(account_id).unwrap(), 1);

    // Recovered categorizer, immediate retry is allowed
    categorizer.set_failing(false);
    let third = sync.sync_at(account_id, t(7, 0)).await.unwrap();
    assert_eq!(third.transactions_added, 1);
    assert_eq!(third.watermark, Some(t(6, 9)));
}

#[tokio::test]
async fn test_throttled_sync_does_not_contact_the_bank() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");

    let bank = Arc::new(MockBank::new());
    bank.push(ACCOUNT, "A", "Bread", -100, t(3, 12));
    let sync = pipeline(&db, bank.clone(), Arc::new(MockCategorizer::default()));

    let now = t(10, 12);
    sync.sync_at(account_id, now).await.unwrap();
    assert_eq!(bank.fetch_calls(), 1);

    bank.push(ACCOUNT, "B", "Milk", -50, t(10, 11));
    let throttled = sync
        .sync_at(account_id, now + Duration::minutes(5))
        .await
        .unwrap();
    assert!(throttled.throttled);
    assert_eq!(throttled.transactions_added, 0);
    assert_eq!(bank.fetch_calls(), 1);

    let later = sync
        .sync_at(account_id, now + Duration::minutes(31))
        .await
        .unwrap();
    assert!(!later.throttled);
    assert_eq!(later.transactions_added, 1);
    assert_eq!(bank.fetch_calls(), 2);
}

#[tokio::test]
async fn test_sync_from_csv_source() {
    let csv = format!(
        "account_number,id,description,amount,time\n\
         {a},CSV-1,Supermarket bread,-250,2024-03-01T09:00:00Z\n\
         {a},CSV-2,Coffee house,-120,2024-03-02T10:30:00Z\n\
         99999,CSV-3,Someone else,-10,2024-03-02T11:00:00Z\n",
        a = ACCOUNT
    );
    let source = Arc::new(CsvTransactionSource::from_reader(csv.as_bytes()).unwrap());

    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");
    let config = AppConfig::embedded().unwrap();
    let engine = CashbackEngine::from_config(db.clone(), &config, source).unwrap();

    let result = engine.sync(account_id).await.unwrap();
    assert_eq!(result.transactions_added, 2);

    let stored = db.list_account_transactions(account_id, 10).unwrap();
    assert_eq!(stored[0].bank_id, "CSV-2");
    assert_eq!(stored[0].category.as_deref(), Some("drinks"));
    assert_eq!(stored[1].category.as_deref(), Some("groceries"));
}

// =============================================================================
// Cashback Allocation
// =============================================================================

fn allocator(db: &Database, recommender: Arc<MockRecommender>) -> CashbackAllocator {
    let config = AppConfig::embedded().unwrap();
    CashbackAllocator::new(db.clone(), recommender, config.cashback)
}

fn three_offers() -> Vec<CashbackOffer> {
    vec![
        CashbackOffer::new("groceries", 10),
        CashbackOffer::new("clothing", 7),
        CashbackOffer::new("electronics", 3),
    ]
}

#[tokio::test]
async fn test_proposal_is_stable() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");
    let recommender = Arc::new(MockRecommender::new(three_offers()));
    let allocator = allocator(&db, recommender.clone());

    let first = allocator.propose(account_id, march()).await.unwrap();
    let second = allocator
        .propose(account_id, NaiveDate::from_ymd_opt(2024, 3, 20).unwrap())
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.cashbacks, second.cashbacks);
    assert_eq!(recommender.calls(), 1);
}

#[tokio::test]
async fn test_concrete_propose_choose_scenario() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");

    // 3 grocery, 2 clothing and 1 electronics purchases in the history window
    let bank = Arc::new(MockBank::new());
    let now = Utc::now();
    for i in 0..3 {
        bank.push(ACCOUNT, &format!("G{}", i), "Bread", -300, now - Duration::days(i + 1));
    }
    for i in 0..2 {
        bank.push(ACCOUNT, &format!("C{}", i), "Jeans", -2000, now - Duration::days(i + 2));
    }
    bank.push(ACCOUNT, "E0", "Laptop", -50000, now - Duration::days(4));

    let config = AppConfig::embedded().unwrap();
    let recommender = Arc::new(SpendingRecommender::from_config(db.clone(), &config));
    let engine = CashbackEngine::with_collaborators(
        db.clone(),
        &config,
        bank,
        Arc::new(MockCategorizer::default()),
        recommender,
    );

    let result = engine.sync_and_propose(account_id, march()).await.unwrap();
    assert_eq!(result.sync.transactions_added, 6);
    assert_eq!(result.proposal.cashbacks, three_offers());
    assert!(result.proposal.can_choose_cashback);

    let chosen = engine
        .choose(
            account_id,
            march(),
            &[
                CashbackOffer::new("groceries", 10),
                CashbackOffer::new("clothing", 7),
            ],
        )
        .unwrap();
    assert_eq!(chosen.state, MonthState::Committed);

    let committed: Vec<(String, bool)> = chosen
        .cashbacks
        .iter()
        .map(|c| (c.product_type.clone(), c.committed))
        .collect();
    assert_eq!(
        committed,
        vec![
            ("groceries".to_string(), true),
            ("clothing".to_string(), true),
            ("electronics".to_string(), false),
        ]
    );

    let err = engine.propose(account_id, march()).await.unwrap_err();
    assert!(matches!(err, Error::CashbackAlreadyCommitted { .. }));
}

#[tokio::test]
async fn test_mismatched_selection_commits_nothing() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");
    let allocator = allocator(&db, Arc::new(MockRecommender::new(three_offers())));
    allocator.propose(account_id, march()).await.unwrap();

    let err = allocator
        .choose(
            account_id,
            march(),
            &[
                CashbackOffer::new("groceries", 10),
                CashbackOffer::new("clothing", 9),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, Error::SelectionMismatch(_)));

    let month = allocator.month_cashbacks(account_id, march()).unwrap();
    assert_eq!(month.state, MonthState::Proposed);
    assert!(month.cashbacks.iter().all(|c| !c.committed));

    // Same request fails the same way until corrected
    assert!(allocator
        .choose(account_id, march(), &[CashbackOffer::new("clothing", 9)])
        .is_err());
    assert!(allocator
        .choose(account_id, march(), &[CashbackOffer::new("clothing", 7)])
        .is_ok());
}

#[tokio::test]
async fn test_concurrent_proposals_store_one_row_set() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "center-invest");
    let recommender = Arc::new(MockRecommender::new(three_offers()));
    recommender.set_delay(Some(StdDuration::from_millis(50)));
    let allocator = allocator(&db, recommender.clone());

    let (a, b) = tokio::join!(
        allocator.propose(account_id, march()),
        allocator.propose(account_id, march())
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.cashbacks, b.cashbacks);
    assert_eq!([a.created, b.created].iter().filter(|c| **c).count(), 1);
    assert_eq!(db.month_cashbacks(account_id, march()).unwrap().len(), 3);
}

#[tokio::test]
async fn test_ineligible_bank_cannot_propose() {
    let db = Database::in_memory().unwrap();
    let account_id = setup(&db, "other-bank");
    let recommender = Arc::new(MockRecommender::new(three_offers()));
    let allocator = allocator(&db, recommender.clone());

    let err = allocator.propose(account_id, march()).await.unwrap_err();
    assert!(matches!(err, Error::AccountNotEligible { .. }));
    assert_eq!(recommender.calls(), 0);
    assert_eq!(
        allocator.state(account_id, march()).unwrap(),
        MonthState::NoCashback
    );
}
