//! Message persistence and the receipt state machine.
//!
//! Every read-then-write operation runs inside a `BEGIN IMMEDIATE`
//! transaction and guards its `UPDATE` on the status it expects to replace,
//! so concurrent receipts for the same rows never report a message as
//! changed twice and never move a status backwards.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use parley_shared::protocol::SeenItem;
use parley_shared::{MessageId, MessageStatus, UserId};

use crate::database::{decode_opt_ts, decode_ts, encode_ts, not_found, now, Database};
use crate::error::{Result, StoreError};
use crate::models::{DeliveryOutcome, Message, PendingDelivery};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, text, created_at, status, delivered_at, seen_at, is_read";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Persist a new message in the `Sent` state. The text is stored trimmed.
    pub fn create_message(&self, sender: UserId, receiver: UserId, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::Validation("message text is empty".into()));
        }
        for user in [sender, receiver] {
            if !self.user_exists(user)? {
                return Err(StoreError::Validation(format!("unknown user {user}")));
            }
        }

        let created_at = now();
        self.conn().execute(
            "INSERT INTO messages (sender_id, receiver_id, text, created_at, status, is_read)
             VALUES (?1, ?2, ?3, ?4, 'sent', 0)",
            params![sender.0, receiver.0, text, encode_ts(&created_at)],
        )?;

        let message = Message {
            id: MessageId(self.conn().last_insert_rowid()),
            sender_id: sender,
            receiver_id: receiver,
            text: text.to_string(),
            created_at,
            status: MessageStatus::Sent,
            delivered_at: None,
            seen_at: None,
            is_read: false,
        };

        tracing::debug!(id = %message.id, %sender, %receiver, "message stored");
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.0],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// Every message exchanged between `a` and `b`, oldest first.
    pub fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![a.0, b.0], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Most recent message in either direction, and how many messages from
    /// `peer` the `owner` has not read yet.
    pub fn last_and_unread(&self, owner: UserId, peer: UserId) -> Result<(Option<Message>, u64)> {
        let last = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE (sender_id = ?1 AND receiver_id = ?2)
                        OR (sender_id = ?2 AND receiver_id = ?1)
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1"
                ),
                params![owner.0, peer.0],
                row_to_message,
            )
            .optional()?;

        let unread: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![peer.0, owner.0],
            |row| row.get(0),
        )?;

        Ok((last, unread.max(0) as u64))
    }

    // ------------------------------------------------------------------
    // Receipts
    // ------------------------------------------------------------------

    /// Move a `Sent` message to `Delivered`. Idempotent.
    pub fn mark_delivered(&mut self, id: MessageId) -> Result<DeliveryOutcome> {
        self.with_retry("mark_delivered", |conn| deliver_one(conn, id, None))
    }

    /// Like [`Database::mark_delivered`], but only for a message that `sender`
    /// addressed to `receiver`. Anything else is reported as unknown.
    pub fn mark_delivered_between(
        &mut self,
        id: MessageId,
        sender: UserId,
        receiver: UserId,
    ) -> Result<DeliveryOutcome> {
        self.with_retry("mark_delivered", |conn| {
            deliver_one(conn, id, Some((sender, receiver)))
        })
    }

    /// Mark every message from `peer` to `owner` that is not yet `Seen` as
    /// seen. Returns exactly the messages this call changed.
    pub fn mark_all_seen(&mut self, owner: UserId, peer: UserId) -> Result<Vec<SeenItem>> {
        self.with_retry("mark_all_seen", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let seen_at = now();
            let ts = encode_ts(&seen_at);

            let ids = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM messages
                     WHERE sender_id = ?1 AND receiver_id = ?2 AND status != 'seen'
                     ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![peer.0, owner.0], |row| row.get::<_, i64>(0))?;
                rows.collect::<rusqlite::Result<Vec<i64>>>()?
            };

            let mut changed = Vec::with_capacity(ids.len());
            for id in ids {
                let affected = tx.execute(
                    "UPDATE messages
                     SET status = 'seen',
                         seen_at = ?2,
                         is_read = 1,
                         delivered_at = COALESCE(delivered_at, ?2)
                     WHERE id = ?1 AND status != 'seen'",
                    params![id, ts],
                )?;
                if affected == 1 {
                    changed.push(SeenItem {
                        id: MessageId(id),
                        ts: seen_at,
                    });
                }
            }

            tx.commit()?;
            Ok(changed)
        })
    }

    /// Flush every `Sent` message addressed to `receiver` to `Delivered`.
    pub fn deliver_all_pending(&mut self, receiver: UserId) -> Result<Vec<PendingDelivery>> {
        self.with_retry("deliver_all_pending", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let pending = {
                let mut stmt = tx.prepare(
                    "SELECT id, sender_id FROM messages
                     WHERE receiver_id = ?1 AND status = 'sent'
                     ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![receiver.0], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?;
                rows.collect::<rusqlite::Result<Vec<(i64, i64)>>>()?
            };

            if pending.is_empty() {
                return Ok(Vec::new());
            }

            let delivered_at = now();
            let ts = encode_ts(&delivered_at);
            let mut delivered = Vec::with_capacity(pending.len());
            for (id, sender) in pending {
                let affected = tx.execute(
                    "UPDATE messages SET status = 'delivered', delivered_at = ?2
                     WHERE id = ?1 AND status = 'sent'",
                    params![id, ts],
                )?;
                if affected == 1 {
                    delivered.push(PendingDelivery {
                        message_id: MessageId(id),
                        sender_id: UserId(sender),
                        delivered_at,
                    });
                }
            }

            tx.commit()?;
            Ok(delivered)
        })
    }
}

fn deliver_one(
    conn: &mut Connection,
    id: MessageId,
    scope: Option<(UserId, UserId)>,
) -> Result<DeliveryOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = tx
        .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![id.0],
            row_to_message,
        )
        .optional()?;

    let Some(current) = current else {
        return Ok(DeliveryOutcome::Unknown);
    };
    if let Some((sender, receiver)) = scope {
        if current.sender_id != sender || current.receiver_id != receiver {
            return Ok(DeliveryOutcome::Unknown);
        }
    }
    if !current.status.can_advance_to(MessageStatus::Delivered) {
        return Ok(DeliveryOutcome::Unchanged(current));
    }

    let delivered_at = now();
    let affected = tx.execute(
        "UPDATE messages SET status = 'delivered', delivered_at = ?2
         WHERE id = ?1 AND status = 'sent'",
        params![id.0, encode_ts(&delivered_at)],
    )?;
    tx.commit()?;

    if affected == 0 {
        return Ok(DeliveryOutcome::Unchanged(current));
    }

    Ok(DeliveryOutcome::Delivered(Message {
        status: MessageStatus::Delivered,
        delivered_at: Some(delivered_at),
        ..current
    }))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let created_at: String = row.get(4)?;
    let status: String = row.get(5)?;
    let status = status.parse::<MessageStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let delivered_at: Option<DateTime<Utc>> = decode_opt_ts(6, row.get(6)?)?;
    let seen_at: Option<DateTime<Utc>> = decode_opt_ts(7, row.get(7)?)?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        sender_id: UserId(row.get(1)?),
        receiver_id: UserId(row.get(2)?),
        text: row.get(3)?,
        created_at: decode_ts(4, &created_at)?,
        status,
        delivered_at,
        seen_at,
        is_read: row.get(8)?,
    })
}
