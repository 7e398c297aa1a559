//! Category catalog and monthly cashback rows

use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{format_month, is_constraint_violation, month_column, Database};
use crate::error::{Error, Result};
use crate::models::{CashbackCategory, CashbackOffer, UserCashback};

/// Canonical form of a category name
pub(crate) fn normalize_category(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Outcome of writing a proposal for an account and month
#[derive(Debug, Clone)]
pub enum ProposalInsert {
    /// This call created the rows
    Inserted(Vec<UserCashback>),
    /// Uncommitted rows already existed (or a concurrent caller won the race)
    AlreadyProposed(Vec<UserCashback>),
    /// The month is already committed
    AlreadyCommitted,
}

fn ensure_category_with(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO cashback_categories (product_type) VALUES (?) ON CONFLICT(product_type) DO NOTHING",
        params![name],
    )?;
    conn.query_row(
        "SELECT id FROM cashback_categories WHERE product_type = ?",
        params![name],
        |row| row.get(0),
    )
}

fn month_rows_with(
    conn: &Connection,
    account_id: i64,
    month: NaiveDate,
) -> rusqlite::Result<Vec<UserCashback>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT uc.id, uc.account_id, uc.category_id, c.product_type, uc.month, uc.value, uc.committed
        FROM user_cashbacks uc
        JOIN cashback_categories c ON c.id = uc.category_id
        WHERE uc.account_id = ? AND uc.month = ?
        ORDER BY uc.value DESC, c.product_type ASC
        "#,
    )?;
    let rows = stmt
        .query_map(params![account_id, format_month(month)], |row| {
            Ok(UserCashback {
                id: row.get(0)?,
                account_id: row.get(1)?,
                category_id: row.get(2)?,
                product_type: row.get(3)?,
                month: month_column(row, 4)?,
                value: row.get(5)?,
                committed: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    /// Get or create a category, returning its id
    pub fn ensure_category(&self, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        Ok(ensure_category_with(&conn, &normalize_category(name))?)
    }

    pub fn get_category(&self, name: &str) -> Result<Option<CashbackCategory>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, product_type FROM cashback_categories WHERE product_type = ?",
                params![normalize_category(name)],
                |row| {
                    Ok(CashbackCategory {
                        id: row.get(0)?,
                        product_type: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(category)
    }

    pub fn list_categories(&self) -> Result<Vec<CashbackCategory>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, product_type FROM cashback_categories ORDER BY product_type")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(CashbackCategory {
                    id: row.get(0)?,
                    product_type: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// All cashback rows of an account for a month, highest value first
    pub fn month_cashbacks(&self, account_id: i64, month: NaiveDate) -> Result<Vec<UserCashback>> {
        let conn = self.conn()?;
        Ok(month_rows_with(&conn, account_id, month)?)
    }

    /// Committed cashbacks of an account for a month
    pub fn committed_cashbacks(&self, account_id: i64, month: NaiveDate) -> Result<Vec<CashbackOffer>> {
        Ok(self
            .month_cashbacks(account_id, month)?
            .into_iter()
            .filter(|c| c.committed)
            .map(|c| c.offer())
            .collect())
    }

    /// Write a proposal unless the month already has rows
    ///
    /// State check and inserts share one IMMEDIATE transaction. If the inserts
    /// hit the unique constraint anyway, the transaction is rolled back and
    /// the rows that won are returned instead.
    pub fn insert_proposal(
        &self,
        account_id: i64,
        month: NaiveDate,
        offers: &[CashbackOffer],
    ) -> Result<ProposalInsert> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = month_rows_with(&tx, account_id, month)?;
        if existing.iter().any(|r| r.committed) {
            return Ok(ProposalInsert::AlreadyCommitted);
        }
        if !existing.is_empty() {
            return Ok(ProposalInsert::AlreadyProposed(existing));
        }

        let insert = |conn: &Connection| -> rusqlite::Result<()> {
            let mut seen = HashSet::new();
            for offer in offers {
                let name = normalize_category(&offer.product_type);
                if !seen.insert(name.clone()) {
                    continue;
                }
                let category_id = ensure_category_with(conn, &name)?;
                conn.execute(
                    "INSERT INTO user_cashbacks (account_id, category_id, month, value, committed) VALUES (?, ?, ?, ?, 0)",
                    params![account_id, category_id, format_month(month), offer.value],
                )?;
            }
            Ok(())
        };

        match insert(&*tx) {
            Ok(()) => {
                let rows = month_rows_with(&tx, account_id, month)?;
                tx.commit()?;
                Ok(ProposalInsert::Inserted(rows))
            }
            Err(e) if is_constraint_violation(&e) => {
                tx.rollback()?;
                let rows = self.month_cashbacks(account_id, month)?;
                if rows.iter().any(|r| r.committed) {
                    Ok(ProposalInsert::AlreadyCommitted)
                } else {
                    Ok(ProposalInsert::AlreadyProposed(rows))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commit the selected proposed rows of a month
    ///
    /// Every selection must name a proposed category with exactly the proposed
    /// value. Validation and the update share one IMMEDIATE transaction; on any
    /// mismatch nothing is committed.
    pub fn commit_selection(
        &self,
        account_id: i64,
        month: NaiveDate,
        selections: &[CashbackOffer],
    ) -> Result<Vec<UserCashback>> {
        if selections.is_empty() {
            return Err(Error::SelectionMismatch("no cashbacks selected".to_string()));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = month_rows_with(&tx, account_id, month)?;
        if rows.iter().any(|r| r.committed) {
            return Err(Error::CashbackAlreadyCommitted {
                account_id,
                month: crate::month::normalize(month),
            });
        }
        if rows.is_empty() {
            return Err(Error::SelectionMismatch(format!(
                "no cashbacks proposed for {}",
                format_month(month)
            )));
        }

        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(selections.len());
        for selection in selections {
            let name = normalize_category(&selection.product_type);
            if !seen.insert(name.clone()) {
                return Err(Error::SelectionMismatch(format!(
                    "'{}' selected more than once",
                    name
                )));
            }
            let row = rows.iter().find(|r| r.product_type == name).ok_or_else(|| {
                Error::SelectionMismatch(format!("'{}' was not proposed", name))
            })?;
            if row.value != selection.value {
                return Err(Error::SelectionMismatch(format!(
                    "'{}' was proposed at {}%, not {}%",
                    name, row.value, selection.value
                )));
            }
            ids.push(row.id);
        }

        let mut updated = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE user_cashbacks SET committed = 1 WHERE id = ? AND committed = 0")?;
            for id in &ids {
                updated += stmt.execute(params![id])?;
            }
        }
        if updated != ids.len() {
            tx.rollback()?;
            return Err(Error::SelectionMismatch(
                "proposal changed while committing".to_string(),
            ));
        }

        let rows = month_rows_with(&tx, account_id, month)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Store cashbacks the bank reports as already chosen
    ///
    /// Rows that already exist for the account, category and month are left untouched.
    pub fn insert_committed_cashbacks(
        &self,
        account_id: i64,
        month: NaiveDate,
        offers: &[CashbackOffer],
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        for offer in offers {
            let category_id = ensure_category_with(&tx, &normalize_category(&offer.product_type))?;
            inserted += tx.execute(
                r#"
                INSERT INTO user_cashbacks (account_id, category_id, month, value, committed)
                VALUES (?, ?, ?, ?, 1)
                ON CONFLICT(account_id, category_id, month) DO NOTHING
                "#,
                params![account_id, category_id, format_month(month), offer.value],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Delete every cashback row of an account, all months
    pub fn reset_cashbacks(&self, account_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM user_cashbacks WHERE account_id = ?",
            params![account_id],
        )?;
        Ok(deleted)
    }
}
