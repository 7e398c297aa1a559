//! User and account onboarding
//!
//! Accounts are discovered through the `AccountDirectory` (or added by hand),
//! stored with insert-then-reselect, and seeded with the cashbacks the bank
//! already has on record for the month.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::external::{with_timeout, AccountDirectory};
use crate::models::{Account, NewUser};
use crate::month;

/// A user together with the accounts stored for them
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub user_id: i64,
    pub accounts: Vec<Account>,
}

pub struct AccountOnboarding {
    db: Database,
    directory: Option<Arc<dyn AccountDirectory>>,
    timeout: Duration,
}

impl AccountOnboarding {
    pub fn new(db: Database, directory: Option<Arc<dyn AccountDirectory>>, timeout: Duration) -> Self {
        Self {
            db,
            directory,
            timeout,
        }
    }

    /// Store the user and everything the directory knows about their accounts
    ///
    /// Without a directory only the user record is written. Directory accounts
    /// already stored for another user are skipped and left untouched.
    pub async fn register(&self, user: &NewUser, month: NaiveDate) -> Result<RegisteredUser> {
        let month = month::normalize(month);
        let user_id = self.db.upsert_user(user)?;

        let Some(directory) = &self.directory else {
            return Ok(RegisteredUser {
                user_id,
                accounts: self.db.list_user_accounts(user_id)?,
            });
        };

        let external = with_timeout(self.timeout, directory.accounts(&user.external_id))
            .await
            .map_err(|e| Error::SourceUnavailable(e.to_string()))?;

        for ext in external {
            if let Some(existing) = self.db.get_account_by_number(&ext.number)? {
                if existing.user_id != user_id {
                    warn!(
                        user_id,
                        account_id = existing.id,
                        owner_id = existing.user_id,
                        "Skipping account owned by another user"
                    );
                    continue;
                }
            }

            // Ask the bank before writing anything for this account
            let committed = with_timeout(
                self.timeout,
                directory.committed_cashbacks(&ext.number, month),
            )
            .await
            .map_err(|e| Error::SourceUnavailable(e.to_string()))?;

            let cards: Vec<&str> = ext.cards.iter().map(|c| c.card_number.as_str()).collect();
            let account = self.store_account(user_id, &ext.number, &ext.bank, &cards)?;
            let seeded = self
                .db
                .insert_committed_cashbacks(account.id, month, &committed)?;

            info!(
                user_id,
                account_id = account.id,
                cards = cards.len(),
                seeded,
                "Account onboarded"
            );
        }

        Ok(RegisteredUser {
            user_id,
            accounts: self.db.list_user_accounts(user_id)?,
        })
    }

    /// Add an account by hand
    pub fn add_account(
        &self,
        user_id: i64,
        number: &str,
        bank: &str,
        cards: &[&str],
    ) -> Result<Account> {
        if self.db.get_user(user_id)?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        let number = number.trim();
        let bank = bank.trim();
        if number.is_empty() || bank.is_empty() {
            return Err(Error::InvalidData(
                "Account number and bank are required".to_string(),
            ));
        }
        self.store_account(user_id, number, bank, cards)
    }

    fn store_account(&self, user_id: i64, number: &str, bank: &str, cards: &[&str]) -> Result<Account> {
        let account_id = self.db.upsert_account(number, bank, user_id)?;
        let account = self.db.require_account(account_id)?;
        if account.user_id != user_id {
            return Err(Error::InvalidData(format!(
                "Account {} belongs to another user",
                number
            )));
        }
        for card in cards {
            self.db.upsert_card(card, account_id)?;
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::MockBank;
    use crate::models::{CashbackOffer, MonthState};

    fn user(id: &str) -> NewUser {
        NewUser {
            external_id: id.to_string(),
            first_name: "Ivan".to_string(),
            surname: "Ivanov".to_string(),
        }
    }

    fn march() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_register_stores_accounts_cards_and_bank_cashbacks() {
        let db = Database::in_memory().unwrap();
        let bank = Arc::new(MockBank::new());
        bank.add_account("u-1", "111", "center-invest", &["4081781234561234"]);
        bank.add_account("u-1", "222", "other-bank", &[]);
        bank.set_committed_cashbacks("222", vec![CashbackOffer::new("drinks", 5)]);

        let onboarding = AccountOnboarding::new(db.clone(), Some(bank), Duration::from_secs(5));
        let registered = onboarding.register(&user("u-1"), march()).await.unwrap();
        assert_eq!(registered.accounts.len(), 2);

        let first = &registered.accounts[0];
        assert_eq!(db.list_cards(first.id).unwrap().len(), 1);

        let second = &registered.accounts[1];
        let rows = db.month_cashbacks(second.id, march()).unwrap();
        assert_eq!(MonthState::from_rows(&rows), MonthState::Committed);

        // Registering again changes nothing
        let again = onboarding.register(&user("u-1"), march()).await.unwrap();
        assert_eq!(again.user_id, registered.user_id);
        assert_eq!(again.accounts.len(), 2);
        assert_eq!(db.month_cashbacks(second.id, march()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_directory_failure() {
        let db = Database::in_memory().unwrap();
        let bank = Arc::new(MockBank::new());
        bank.add_account("u-1", "111", "center-invest", &[]);
        bank.set_failing(true);

        let onboarding = AccountOnboarding::new(db.clone(), Some(bank), Duration::from_secs(5));
        let err = onboarding.register(&user("u-1"), march()).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(db.get_account_by_number("111").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_skips_account_of_another_user() {
        let db = Database::in_memory().unwrap();
        let owner = db.upsert_user(&user("owner")).unwrap();
        let taken = db.upsert_account("111", "center-invest", owner).unwrap();

        let bank = Arc::new(MockBank::new());
        bank.add_account("u-1", "111", "center-invest", &["4081781234561234"]);
        bank.add_account("u-1", "222", "center-invest", &[]);
        bank.set_committed_cashbacks("111", vec![CashbackOffer::new("drinks", 5)]);

        let onboarding = AccountOnboarding::new(db.clone(), Some(bank), Duration::from_secs(5));
        let registered = onboarding.register(&user("u-1"), march()).await.unwrap();

        let numbers: Vec<&str> = registered
            .accounts
            .iter()
            .map(|a| a.number.as_str())
            .collect();
        assert_eq!(numbers, vec!["222"]);

        // The other user's account is unchanged
        let account = db.require_account(taken).unwrap();
        assert_eq!(account.user_id, owner);
        assert!(db.list_cards(taken).unwrap().is_empty());
        assert!(db.month_cashbacks(taken, march()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_without_directory() {
        let db = Database::in_memory().unwrap();
        let onboarding = AccountOnboarding::new(db, None, Duration::from_secs(5));
        let registered = onboarding.register(&user("u-9"), march()).await.unwrap();
        assert!(registered.accounts.is_empty());
    }

    #[test]
    fn test_add_account_checks_owner() {
        let db = Database::in_memory().unwrap();
        let a = db.upsert_user(&user("a")).unwrap();
        let b = db.upsert_user(&user("b")).unwrap();
        let onboarding = AccountOnboarding::new(db, None, Duration::from_secs(5));

        let account = onboarding
            .add_account(a, "111", "center-invest", &["1111222233334444"])
            .unwrap();
        assert_eq!(account.user_id, a);

        assert!(matches!(
            onboarding.add_account(b, "111", "center-invest", &[]),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            onboarding.add_account(999, "333", "center-invest", &[]),
            Err(Error::UserNotFound(_))
        ));
        assert!(matches!(
            onboarding.add_account(a, "  ", "center-invest", &[]),
            Err(Error::InvalidData(_))
        ));
    }
}
