//! Category spending limits

use chrono::NaiveDate;
use rusqlite::params;

use super::cashbacks::normalize_category;
use super::Database;
use crate::error::{Error, Result};
use crate::models::{CategoryLimit, LimitStatus};

impl Database {
    /// Set the monthly limit for a category, replacing any earlier value
    pub fn set_category_limit(&self, user_id: i64, category: &str, value: i64) -> Result<i64> {
        if value < 0 {
            return Err(Error::InvalidData(format!(
                "Limit must not be negative, got {}",
                value
            )));
        }
        if self.get_user(user_id)?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }

        let category = normalize_category(category);
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO category_limits (user_id, category, value) VALUES (?, ?, ?)
            ON CONFLICT(user_id, category) DO UPDATE SET value = excluded.value
            "#,
            params![user_id, category, value],
        )?;

        let id = conn.query_row(
            "SELECT id FROM category_limits WHERE user_id = ? AND category = ?",
            params![user_id, category],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn list_category_limits(&self, user_id: i64) -> Result<Vec<CategoryLimit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, category, value FROM category_limits WHERE user_id = ? ORDER BY category",
        )?;
        let limits = stmt
            .query_map(params![user_id], |row| {
                Ok(CategoryLimit {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    category: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(limits)
    }

    pub fn delete_category_limit(&self, user_id: i64, category: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM category_limits WHERE user_id = ? AND category = ?",
            params![user_id, normalize_category(category)],
        )?;
        Ok(deleted > 0)
    }

    /// Spending against each limit of a user for one month
    pub fn limit_report(&self, user_id: i64, month: NaiveDate) -> Result<Vec<LimitStatus>> {
        self.list_category_limits(user_id)?
            .into_iter()
            .map(|limit| {
                let spent = self.user_category_spent(user_id, &limit.category, month)?;
                Ok(LimitStatus {
                    remaining: limit.value - spent,
                    category: limit.category,
                    limit: limit.value,
                    spent,
                })
            })
            .collect()
    }
}
