//! User operations

use rusqlite::{params, OptionalExtension};

use super::{timestamp_column, Database};
use crate::error::Result;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, external_id, first_name, surname, created_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        first_name: row.get(2)?,
        surname: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

impl Database {
    /// Create a user or return the existing one with the same external id
    ///
    /// Names are refreshed on every call; the id never changes.
    pub fn upsert_user(&self, user: &NewUser) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (external_id, first_name, surname) VALUES (?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                first_name = excluded.first_name,
                surname = excluded.surname
            "#,
            params![user.external_id, user.first_name, user.surname],
        )?;

        let id = conn.query_row(
            "SELECT id FROM users WHERE external_id = ?",
            params![user.external_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE external_id = ?", USER_COLUMNS),
                params![external_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }
}
