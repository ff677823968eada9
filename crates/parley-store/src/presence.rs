//! Persisted last-seen timestamps. The expiring online marker lives in the
//! relay process; only the non-expiring half is stored here.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use parley_shared::UserId;

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::Result;

impl Database {
    pub fn touch_last_seen(&self, user: UserId, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO presence (user_id, last_seen) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET last_seen = excluded.last_seen",
            params![user.0, encode_ts(&at)],
        )?;
        Ok(())
    }

    pub fn last_seen(&self, user: UserId) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT last_seen FROM presence WHERE user_id = ?1",
                params![user.0],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw.map(|s| decode_ts(0, &s)).transpose()?)
    }
}
