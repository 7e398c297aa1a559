//! In-process mock collaborators
//!
//! Each mock counts its calls and can be switched into a failing mode, so
//! tests can assert both what the engines did and what they did not do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    AccountDirectory, Categorizer, CollaboratorError, CollaboratorResult, ExternalAccount,
    ExternalCard, ExternalTransaction, Recommender, TransactionSource,
};
use crate::models::CashbackOffer;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mock bank: transaction source and account directory in one
#[derive(Default)]
pub struct MockBank {
    transactions: Mutex<Vec<(String, ExternalTransaction)>>,
    accounts: Mutex<HashMap<String, Vec<ExternalAccount>>>,
    cashbacks: Mutex<HashMap<String, Vec<CashbackOffer>>>,
    fetch_calls: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a transaction available for `account_number`
    pub fn push(
        &self,
        account_number: &str,
        id: &str,
        description: &str,
        amount: i64,
        time: DateTime<Utc>,
    ) {
        lock(&self.transactions).push((
            account_number.to_string(),
            ExternalTransaction {
                id: id.to_string(),
                description: description.to_string(),
                amount,
                time,
            },
        ));
    }

    /// Register an account for a user in the directory
    pub fn add_account(&self, user_external_id: &str, number: &str, bank: &str, cards: &[&str]) {
        lock(&self.accounts)
            .entry(user_external_id.to_string())
            .or_default()
            .push(ExternalAccount {
                number: number.to_string(),
                bank: bank.to_string(),
                cards: cards
                    .iter()
                    .map(|c| ExternalCard {
                        card_number: c.to_string(),
                    })
                    .collect(),
            });
    }

    /// Cashbacks the bank reports as already chosen for an account
    pub fn set_committed_cashbacks(&self, account_number: &str, offers: Vec<CashbackOffer>) {
        lock(&self.cashbacks).insert(account_number.to_string(), offers);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every fetch (for timeout tests)
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Number of `fetch` calls so far
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> CollaboratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CollaboratorError::Unavailable("mock bank is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransactionSource for MockBank {
    async fn fetch(
        &self,
        account_number: &str,
        since: Option<DateTime<Utc>>,
    ) -> CollaboratorResult<Vec<ExternalTransaction>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;

        Ok(lock(&self.transactions)
            .iter()
            .filter(|(number, t)| number == account_number && since.map_or(true, |s| t.time > s))
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[async_trait]
impl AccountDirectory for MockBank {
    async fn accounts(&self, user_external_id: &str) -> CollaboratorResult<Vec<ExternalAccount>> {
        self.check_available()?;
        Ok(lock(&self.accounts)
            .get(user_external_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn committed_cashbacks(
        &self,
        account_number: &str,
        _month: NaiveDate,
    ) -> CollaboratorResult<Vec<CashbackOffer>> {
        self.check_available()?;
        Ok(lock(&self.cashbacks)
            .get(account_number)
            .cloned()
            .unwrap_or_default())
    }
}

/// Keyword categorizer that records every batch it receives
pub struct MockCategorizer {
    keywords: Vec<(String, String)>,
    fallback: String,
    batches: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
}

impl Default for MockCategorizer {
    fn default() -> Self {
        Self::new(&[
            ("bread", "groceries"),
            ("milk", "groceries"),
            ("coffee", "drinks"),
            ("jeans", "clothing"),
            ("laptop", "electronics"),
        ])
    }
}

impl MockCategorizer {
    /// `keywords` are matched case-insensitively against the description
    pub fn new(keywords: &[(&str, &str)]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|(k, c)| (k.to_lowercase(), c.to_string()))
                .collect(),
            fallback: "other".to_string(),
            batches: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every batch of descriptions received so far
    pub fn batches(&self) -> Vec<Vec<String>> {
        lock(&self.batches).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.batches).len()
    }
}

#[async_trait]
impl Categorizer for MockCategorizer {
    async fn classify(&self, descriptions: &[String]) -> CollaboratorResult<Vec<String>> {
        lock(&self.batches).push(descriptions.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(
                "mock categorizer is down".to_string(),
            ));
        }

        Ok(descriptions
            .iter()
            .map(|d| {
                let d = d.to_lowercase();
                self.keywords
                    .iter()
                    .find(|(k, _)| d.contains(k.as_str()))
                    .map(|(_, c)| c.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

/// How a `MockRecommender` answers
#[derive(Debug, Clone)]
pub enum MockRanking {
    Offers(Vec<CashbackOffer>),
    InsufficientHistory,
    Unavailable,
}

/// Recommender returning a scripted ranking
pub struct MockRecommender {
    ranking: Mutex<MockRanking>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockRecommender {
    pub fn new(offers: Vec<CashbackOffer>) -> Self {
        Self {
            ranking: Mutex::new(MockRanking::Offers(offers)),
            calls: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    pub fn set_ranking(&self, ranking: MockRanking) {
        *lock(&self.ranking) = ranking;
    }

    /// Delay every call (for concurrency tests)
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recommender for MockRecommender {
    async fn rank(&self, _account_id: i64) -> CollaboratorResult<Vec<CashbackOffer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let ranking = lock(&self.ranking).clone();
        match ranking {
            MockRanking::Offers(offers) => Ok(offers),
            MockRanking::InsufficientHistory => Err(CollaboratorError::InsufficientHistory),
            MockRanking::Unavailable => Err(CollaboratorError::Unavailable(
                "mock recommender is down".to_string(),
            )),
        }
    }
}
