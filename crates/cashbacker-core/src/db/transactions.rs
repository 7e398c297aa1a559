//! Transaction operations

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, TransactionBehavior};

use super::{format_timestamp, opt_timestamp_column, timestamp_column, Database};
use crate::error::Result;
use crate::models::{AccountTransactions, CategorySpending, NewTransaction, Transaction};

const TRANSACTION_COLUMNS: &str = "id, bank_id, account_id, description, amount, time, category";

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        bank_id: row.get(1)?,
        account_id: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        time: timestamp_column(row, 5)?,
        category: row.get(6)?,
    })
}

/// Result of storing one batch of synced transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResult {
    pub inserted: usize,
    /// Rows skipped because their bank id was already stored
    pub duplicates: usize,
    /// Account watermark after the batch
    pub watermark: Option<DateTime<Utc>>,
}

impl Database {
    /// Store a batch of transactions and advance the account watermark
    ///
    /// Runs as one IMMEDIATE transaction: either every new row is stored and
    /// the watermark moves to the newest inserted timestamp, or nothing changes.
    /// Rows whose `bank_id` already exists are skipped. The watermark never
    /// moves backwards.
    pub fn store_synced_transactions(
        &self,
        account_id: i64,
        batch: &[NewTransaction],
    ) -> Result<StoreResult> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut inserted = 0;
        let mut newest: Option<DateTime<Utc>> = None;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO transactions (bank_id, account_id, description, amount, time, category)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(bank_id) DO NOTHING
                "#,
            )?;

            for t in batch {
                let changed = stmt.execute(params![
                    t.bank_id,
                    account_id,
                    t.description,
                    t.amount,
                    format_timestamp(t.time),
                    t.category,
                ])?;
                if changed > 0 {
                    inserted += 1;
                    newest = Some(newest.map_or(t.time, |n| n.max(t.time)));
                }
            }
        }

        if let Some(ts) = newest {
            tx.execute(
                r#"
                UPDATE accounts SET last_tx_time = ?1
                WHERE id = ?2 AND (last_tx_time IS NULL OR last_tx_time < ?1)
                "#,
                params![format_timestamp(ts), account_id],
            )?;
        }

        let watermark = tx.query_row(
            "SELECT last_tx_time FROM accounts WHERE id = ?",
            params![account_id],
            |row| opt_timestamp_column(row, 0),
        )?;

        tx.commit()?;

        Ok(StoreResult {
            inserted,
            duplicates: batch.len() - inserted,
            watermark,
        })
    }

    /// Most recent transactions of an account, newest first
    pub fn list_account_transactions(&self, account_id: i64, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE account_id = ? ORDER BY time DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(params![account_id, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Transactions of an account with `start <= time < end`, oldest first
    pub fn transactions_between(
        &self,
        account_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE account_id = ? AND time >= ? AND time < ? ORDER BY time, id",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(
                params![account_id, format_timestamp(start), format_timestamp(end)],
                row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Transactions of every account of a user within a month
    pub fn user_transactions_for_month(
        &self,
        user_id: i64,
        month: NaiveDate,
    ) -> Result<Vec<AccountTransactions>> {
        let (start, end) = crate::month::bounds(month);
        self.list_user_accounts(user_id)?
            .into_iter()
            .map(|account| {
                let transactions = self.transactions_between(account.id, start, end)?;
                Ok(AccountTransactions {
                    account_id: account.id,
                    account_number: account.number,
                    bank: account.bank,
                    transactions,
                })
            })
            .collect()
    }

    pub fn count_account_transactions(&self, account_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE account_id = ?",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Classified outflows of an account since `since`, grouped by category
    ///
    /// Ordered by transaction count, then total spent, then name.
    pub fn category_spending(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategorySpending>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT category, COUNT(*) AS cnt, -SUM(amount) AS spent
            FROM transactions
            WHERE account_id = ? AND time >= ? AND amount < 0 AND category IS NOT NULL
            GROUP BY category
            ORDER BY cnt DESC, spent DESC, category ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![account_id, format_timestamp(since)], |row| {
                Ok(CategorySpending {
                    category: row.get(0)?,
                    transaction_count: row.get(1)?,
                    total_spent: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Outflows of all a user's accounts in one category for a month, as a positive sum
    pub fn user_category_spent(&self, user_id: i64, category: &str, month: NaiveDate) -> Result<i64> {
        let (start, end) = crate::month::bounds(month);
        let conn = self.conn()?;
        let spent = conn.query_row(
            r#"
            SELECT COALESCE(-SUM(t.amount), 0)
            FROM transactions t
            JOIN accounts a ON a.id = t.account_id
            WHERE a.user_id = ? AND t.category = ? AND t.amount < 0
              AND t.time >= ? AND t.time < ?
            "#,
            params![user_id, category, format_timestamp(start), format_timestamp(end)],
            |row| row.get(0),
        )?;
        Ok(spent)
    }
}
