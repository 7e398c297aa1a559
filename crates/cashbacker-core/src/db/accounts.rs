//! Account and card operations, including the sync throttle slot

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{format_timestamp, opt_timestamp_column, timestamp_column, Database};
use crate::error::{Error, Result};
use crate::models::{Account, Card};

const ACCOUNT_COLUMNS: &str =
    "id, number, bank, user_id, last_tx_time, last_sync_attempt, created_at";

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        number: row.get(1)?,
        bank: row.get(2)?,
        user_id: row.get(3)?,
        last_tx_time: opt_timestamp_column(row, 4)?,
        last_sync_attempt: opt_timestamp_column(row, 5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

/// Outcome of trying to take the sync slot of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncClaim {
    /// The slot was free; `previous` is the attempt time it replaced
    Claimed {
        previous: Option<DateTime<Utc>>,
    },
    /// Another attempt happened inside the cool-down window
    Throttled,
}

impl Database {
    /// Insert an account, or return the id of the existing account with that number
    ///
    /// An existing account keeps its owner and bank.
    pub fn upsert_account(&self, number: &str, bank: &str, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (number, bank, user_id) VALUES (?, ?, ?) ON CONFLICT(number) DO NOTHING",
            params![number, bank, user_id],
        )?;

        let id = conn.query_row(
            "SELECT id FROM accounts WHERE number = ?",
            params![number],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Get an account by ID
    pub fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS),
                params![id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Get an account by ID, failing with `AccountNotFound`
    pub fn require_account(&self, id: i64) -> Result<Account> {
        self.get_account(id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    pub fn get_account_by_number(&self, number: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE number = ?", ACCOUNT_COLUMNS),
                params![number],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// List all accounts
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLUMNS))?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// List the accounts of one user
    pub fn list_user_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE user_id = ? ORDER BY id",
            ACCOUNT_COLUMNS
        ))?;
        let accounts = stmt
            .query_map(params![user_id], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Delete an account (cards, transactions and cashbacks cascade)
    pub fn delete_account(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM accounts WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Insert a card or return the existing card id
    pub fn upsert_card(&self, card_number: &str, account_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cards (card_number, account_id) VALUES (?, ?) ON CONFLICT(card_number) DO NOTHING",
            params![card_number, account_id],
        )?;

        let id = conn.query_row(
            "SELECT id FROM cards WHERE card_number = ?",
            params![card_number],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn list_cards(&self, account_id: i64) -> Result<Vec<Card>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, card_number, account_id FROM cards WHERE account_id = ? ORDER BY id",
        )?;
        let cards = stmt
            .query_map(params![account_id], |row| {
                Ok(Card {
                    id: row.get(0)?,
                    card_number: row.get(1)?,
                    account_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// Take the sync slot of an account unless an attempt happened within `cooldown`
    ///
    /// Check and write happen inside one IMMEDIATE transaction, so of two
    /// concurrent callers exactly one gets `Claimed`.
    pub fn claim_sync_attempt(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<SyncClaim> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous: Option<Option<String>> = tx
            .query_row(
                "SELECT last_sync_attempt FROM accounts WHERE id = ?",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        let previous = previous.ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
        let previous = previous
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::InvalidData(format!("Bad last_sync_attempt '{}': {}", s, e)))
            })
            .transpose()?;

        if let Some(last) = previous {
            if now - last < cooldown {
                return Ok(SyncClaim::Throttled);
            }
        }

        tx.execute(
            "UPDATE accounts SET last_sync_attempt = ? WHERE id = ?",
            params![format_timestamp(now), account_id],
        )?;
        tx.commit()?;

        Ok(SyncClaim::Claimed { previous })
    }

    /// Give back a claimed sync slot after a failed attempt
    ///
    /// Restores `previous` only if the slot still holds `claimed`, so a newer
    /// attempt by another caller is never overwritten.
    pub fn release_sync_attempt(
        &self,
        account_id: i64,
        claimed: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET last_sync_attempt = ? WHERE id = ? AND last_sync_attempt = ?",
            params![
                previous.map(format_timestamp),
                account_id,
                format_timestamp(claimed)
            ],
        )?;
        Ok(updated > 0)
    }
}
