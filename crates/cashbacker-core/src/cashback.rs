//! Monthly cashback allocation
//!
//! Per account and month the state is derived from the stored rows:
//!
//! ```text
//! NoCashback --propose--> Proposed --choose--> Committed
//!                           |  ^
//!                           +--+ propose returns the same rows
//! ```
//!
//! `Committed` is terminal for the month; proposing again fails with
//! `CashbackAlreadyCommitted`. Only `reset` (administrative) deletes rows.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::CashbackConfig;
use crate::db::{Database, ProposalInsert};
use crate::error::{Error, Result};
use crate::external::{with_timeout, CollaboratorError, Recommender};
use crate::models::{
    Account, AccountOverview, CashbackOffer, MonthCashbacks, MonthState, Proposal, UserCashback,
};
use crate::month;

pub struct CashbackAllocator {
    db: Database,
    recommender: Arc<dyn Recommender>,
    config: CashbackConfig,
}

impl CashbackAllocator {
    pub fn new(db: Database, recommender: Arc<dyn Recommender>, config: CashbackConfig) -> Self {
        Self {
            db,
            recommender,
            config,
        }
    }

    /// Whether the account's bank lets the user choose cashback categories
    pub fn is_eligible(&self, account: &Account) -> bool {
        self.config.is_eligible_bank(&account.bank)
    }

    fn require_eligible(&self, account: &Account) -> Result<()> {
        if self.is_eligible(account) {
            Ok(())
        } else {
            Err(Error::AccountNotEligible {
                account_id: account.id,
                bank: account.bank.clone(),
            })
        }
    }

    /// Current state and rows of an account for a month
    pub fn month_cashbacks(&self, account_id: i64, month: NaiveDate) -> Result<MonthCashbacks> {
        let month = month::normalize(month);
        self.db.require_account(account_id)?;
        let cashbacks = self.db.month_cashbacks(account_id, month)?;
        Ok(MonthCashbacks {
            account_id,
            month,
            state: MonthState::from_rows(&cashbacks),
            cashbacks,
        })
    }

    pub fn state(&self, account_id: i64, month: NaiveDate) -> Result<MonthState> {
        Ok(self.month_cashbacks(account_id, month)?.state)
    }

    /// Propose cashback categories for a month
    ///
    /// Returns the stored proposal if one exists. Otherwise asks the
    /// recommender and stores its answer; if a concurrent caller stored a
    /// proposal first, that one is returned. Insufficient history yields an
    /// empty proposal with nothing stored.
    pub async fn propose(&self, account_id: i64, month: NaiveDate) -> Result<Proposal> {
        let month = month::normalize(month);
        let account = self.db.require_account(account_id)?;
        self.require_eligible(&account)?;

        let existing = self.db.month_cashbacks(account_id, month)?;
        match MonthState::from_rows(&existing) {
            MonthState::Committed => {
                return Err(Error::CashbackAlreadyCommitted { account_id, month });
            }
            MonthState::Proposed => {
                debug!(account_id, %month, "Returning existing proposal");
                return Ok(self.proposal(&account, month, &existing, false));
            }
            MonthState::NoCashback => {}
        }

        let ranked = match with_timeout(self.config.timeout(), self.recommender.rank(account_id)).await
        {
            Ok(offers) => offers,
            Err(CollaboratorError::InsufficientHistory) => {
                info!(account_id, %month, "Not enough history to propose cashback");
                return Ok(self.proposal(&account, month, &[], false));
            }
            Err(e) => return Err(Error::RecommenderUnavailable(e.to_string())),
        };

        let offers: Vec<CashbackOffer> = ranked
            .into_iter()
            .take(self.config.max_candidates)
            .collect();
        if offers.is_empty() {
            return Ok(self.proposal(&account, month, &[], false));
        }

        match self.db.insert_proposal(account_id, month, &offers)? {
            ProposalInsert::Inserted(rows) => {
                info!(account_id, %month, rows = rows.len(), "Cashback proposed");
                Ok(self.proposal(&account, month, &rows, true))
            }
            ProposalInsert::AlreadyProposed(rows) => {
                debug!(account_id, %month, "Concurrent proposal won, returning it");
                Ok(self.proposal(&account, month, &rows, false))
            }
            ProposalInsert::AlreadyCommitted => {
                warn!(account_id, %month, "Month committed while proposing");
                Err(Error::CashbackAlreadyCommitted { account_id, month })
            }
        }
    }

    fn proposal(
        &self,
        account: &Account,
        month: NaiveDate,
        rows: &[UserCashback],
        created: bool,
    ) -> Proposal {
        Proposal {
            account_id: account.id,
            account_number: account.number.clone(),
            bank: account.bank.clone(),
            month,
            cashbacks: rows.iter().map(UserCashback::offer).collect(),
            can_choose_cashback: self.is_eligible(account),
            created,
        }
    }

    /// Commit a subset of the proposed cashbacks
    ///
    /// Selections are matched to proposed rows by category; each value must
    /// equal the proposed one. Any mismatch rejects the whole selection.
    pub fn choose(
        &self,
        account_id: i64,
        month: NaiveDate,
        selections: &[CashbackOffer],
    ) -> Result<MonthCashbacks> {
        let month = month::normalize(month);
        let account = self.db.require_account(account_id)?;
        self.require_eligible(&account)?;

        let cashbacks = self.db.commit_selection(account_id, month, selections)?;
        info!(
            account_id,
            %month,
            committed = selections.len(),
            "Cashback chosen"
        );

        Ok(MonthCashbacks {
            account_id,
            month,
            state: MonthState::from_rows(&cashbacks),
            cashbacks,
        })
    }

    /// Accounts of a user with their committed cashbacks for a month
    pub fn overview(&self, user_id: i64, month: NaiveDate) -> Result<Vec<AccountOverview>> {
        let month = month::normalize(month);
        if self.db.get_user(user_id)?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }

        self.db
            .list_user_accounts(user_id)?
            .into_iter()
            .map(|account| {
                let cards = self
                    .db
                    .list_cards(account.id)?
                    .iter()
                    .map(|c| c.last_four_digits().to_string())
                    .collect();
                Ok(AccountOverview {
                    account_id: account.id,
                    can_choose_cashback: self.is_eligible(&account),
                    cashbacks: self.db.committed_cashbacks(account.id, month)?,
                    cards,
                    account_number: account.number,
                    bank: account.bank,
                })
            })
            .collect()
    }

    /// Delete every cashback row of an account (all months)
    pub fn reset(&self, account_id: i64) -> Result<usize> {
        self.db.require_account(account_id)?;
        let deleted = self.db.reset_cashbacks(account_id)?;
        info!(account_id, deleted, "Cashbacks reset");
        Ok(deleted)
    }
}
