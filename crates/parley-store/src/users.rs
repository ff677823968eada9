//! Read access to account rows, plus an insert used by seeding and tests.

use rusqlite::params;

use parley_shared::UserId;

use crate::database::{decode_ts, encode_ts, not_found, now, Database};
use crate::error::{Result, StoreError};
use crate::models::User;

const USER_COLUMNS: &str = "id, username, first_name, last_name, created_at";

impl Database {
    pub fn create_user(&self, username: &str, first_name: &str, last_name: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::Validation("username must not be empty".into()));
        }

        let created_at = now();
        self.conn().execute(
            "INSERT INTO users (username, first_name, last_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, first_name, last_name, encode_ts(&created_at)],
        )?;

        Ok(User {
            id: UserId(self.conn().last_insert_rowid()),
            username: username.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            created_at,
        })
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Every account except `me`, ordered by username.
    pub fn list_users_except(&self, me: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY username ASC"
        ))?;

        let rows = stmt.query_map(params![me.0], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub(crate) fn user_exists(&self, id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(4)?;
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        created_at: decode_ts(4, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice", "Alice", "Liddell").unwrap();

        assert_eq!(db.get_user(alice.id).unwrap(), alice);
        assert_eq!(db.get_user_by_username("alice").unwrap(), alice);
        assert_eq!(alice.public().first_name, "Alice");
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(UserId(99)), Err(StoreError::NotFound)));
        assert!(matches!(
            db.get_user_by_username("nobody"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "", "").unwrap();
        assert!(db.create_user("alice", "", "").is_err());
        assert!(db.create_user("   ", "", "").is_err());
    }

    #[test]
    fn list_excludes_caller_and_sorts() {
        let db = Database::open_in_memory().unwrap();
        let carol = db.create_user("carol", "", "").unwrap();
        db.create_user("bob", "", "").unwrap();
        db.create_user("alice", "", "").unwrap();

        let names: Vec<String> = db
            .list_users_except(carol.id)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
