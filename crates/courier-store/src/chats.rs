//! Chat identity resolution and chat lifecycle.
//!
//! A pair of participants gets exactly one chat.  Resolution first runs the
//! grouping lookup over `chat_participants` (a chat where both public ids
//! already appear); on a miss it creates the chat and both participant rows
//! in one transaction.  The sorted `pair_key` column carries a UNIQUE index,
//! so two racing creators cannot both commit: the loser's insert fails with
//! a constraint violation and resolution falls back to looking the winner up
//! by pair key.

use chrono::{DateTime, Utc};
use courier_shared::PublicId;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatParticipant};

/// Canonical key for an unordered participant pair.
fn pair_key(a: &PublicId, b: &PublicId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}|{}", lo.as_str(), hi.as_str())
}

impl Database {
    // ------------------------------------------------------------------
    // Identity resolution
    // ------------------------------------------------------------------

    /// Find or create the single chat connecting `local` and `remote`.
    ///
    /// Idempotent: calling twice with the same pair (in either order)
    /// returns the same chat id and leaves exactly one chat row behind.
    /// A newly created chat is named after the counterpart's display name.
    pub fn resolve_or_create_chat(
        &mut self,
        local: &PublicId,
        remote: &PublicId,
        display_name: &str,
    ) -> Result<i64> {
        if let Some(chat_id) = self.find_chat_for_pair(local, remote)? {
            return Ok(chat_id);
        }

        let key = pair_key(local, remote);
        let now = Utc::now();

        let created = {
            let tx = self.conn_mut().transaction()?;

            let insert = tx.execute(
                "INSERT INTO chats (name, is_group, last_updated, pair_key)
                 VALUES (?1, 0, ?2, ?3)",
                params![display_name, now.to_rfc3339(), key],
            );

            match insert {
                Ok(_) => {
                    let chat_id = tx.last_insert_rowid();
                    for public_id in [local, remote] {
                        tx.execute(
                            "INSERT INTO chat_participants (contact_public_id, chat_id)
                             VALUES (?1, ?2)",
                            params![public_id.as_str(), chat_id],
                        )?;
                    }
                    tx.commit()?;
                    Some(chat_id)
                }
                // Lost the creation race: another caller committed this
                // pair between our lookup and our insert.
                Err(e) if is_constraint_violation(&e) => None,
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(chat_id) = created {
            tracing::debug!(chat_id, "created chat");
            self.notify_chats_changed();
            return Ok(chat_id);
        }

        self.conn()
            .query_row(
                "SELECT id FROM chats WHERE pair_key = ?1",
                params![pair_key(local, remote)],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Grouping lookup: a chat id under which both public ids appear as
    /// participants.  Returns `None` when no such chat exists.
    fn find_chat_for_pair(&self, a: &PublicId, b: &PublicId) -> Result<Option<i64>> {
        let mut stmt = self.conn().prepare(
            "SELECT chat_id
             FROM chat_participants
             WHERE contact_public_id IN (?1, ?2)
             GROUP BY chat_id
             HAVING COUNT(*) = 2",
        )?;

        let mut rows = stmt.query(params![a.as_str(), b.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by local id.
    pub fn get_chat(&self, id: i64) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, name, public_chat_id, image_url, is_group,
                        last_message, last_timestamp, last_updated, unread_count
                 FROM chats
                 WHERE id = ?1",
                params![id],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List the participant rows of a chat.
    pub fn chat_participants(&self, chat_id: i64) -> Result<Vec<ChatParticipant>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, contact_public_id, contact_id, chat_id
             FROM chat_participants
             WHERE chat_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id], |row| {
            Ok(ChatParticipant {
                id: row.get(0)?,
                contact_public_id: PublicId(row.get(1)?),
                contact_id: row.get(2)?,
                chat_id: row.get(3)?,
            })
        })?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a chat and everything it owns.
    ///
    /// Children go first, in strict order: media of the chat's messages,
    /// then the messages, then the participant rows, then the chat itself.
    /// The cascading foreign keys would do this on their own, but the order
    /// is part of the contract and holds even on an engine without cascade
    /// triggers.  Returns `true` if the chat existed.
    pub fn delete_chat(&mut self, chat_id: i64) -> Result<bool> {
        let existed = {
            let tx = self.conn_mut().transaction()?;

            tx.execute(
                "DELETE FROM media_files
                 WHERE message_id IN (SELECT id FROM messages WHERE chat_id = ?1)",
                params![chat_id],
            )?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
            tx.execute(
                "DELETE FROM chat_participants WHERE chat_id = ?1",
                params![chat_id],
            )?;
            let affected = tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;

            tx.commit()?;
            affected > 0
        };

        if existed {
            tracing::debug!(chat_id, "deleted chat");
            self.notify_chats_changed();
        }
        Ok(existed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Map a `rusqlite::Row` to a [`Chat`].
pub(crate) fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        name: row.get(1)?,
        public_chat_id: row.get::<_, Option<String>>(2)?.map(PublicId),
        image_url: row.get(3)?,
        is_group: row.get(4)?,
        last_message: row.get(5)?,
        last_timestamp: parse_optional_timestamp(row, 6)?,
        last_updated: parse_timestamp(row, 7)?,
        unread_count: row.get(8)?,
    })
}

pub(crate) fn parse_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_optional_timestamp(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn resolving_twice_returns_the_same_chat() {
        let mut db = db();
        let a = PublicId::from("u-local");
        let b = PublicId::from("u-remote");

        let first = db.resolve_or_create_chat(&a, &b, "Amara").unwrap();
        let second = db.resolve_or_create_chat(&a, &b, "Amara").unwrap();
        assert_eq!(first, second);

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn pair_order_does_not_matter() {
        let mut db = db();
        let a = PublicId::from("u-local");
        let b = PublicId::from("u-remote");

        let first = db.resolve_or_create_chat(&a, &b, "Amara").unwrap();
        let second = db.resolve_or_create_chat(&b, &a, "Me").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn new_chat_carries_both_participants() {
        let mut db = db();
        let a = PublicId::from("u-local");
        let b = PublicId::from("u-remote");

        let chat_id = db.resolve_or_create_chat(&a, &b, "Amara").unwrap();

        let participants = db.chat_participants(chat_id).unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].contact_public_id, a);
        assert_eq!(participants[1].contact_public_id, b);

        let chat = db.get_chat(chat_id).unwrap();
        assert_eq!(chat.name, "Amara");
        assert!(!chat.is_group);
        assert_eq!(chat.last_message, None);
        assert_eq!(chat.unread_count, 0);
    }

    #[test]
    fn distinct_pairs_get_distinct_chats() {
        let mut db = db();
        let me = PublicId::from("u-me");

        let with_a = db
            .resolve_or_create_chat(&me, &PublicId::from("u-a"), "A")
            .unwrap();
        let with_b = db
            .resolve_or_create_chat(&me, &PublicId::from("u-b"), "B")
            .unwrap();
        assert_ne!(with_a, with_b);
    }

    #[test]
    fn duplicate_pair_insert_is_rejected_by_schema() {
        let mut db = db();
        let a = PublicId::from("u-local");
        let b = PublicId::from("u-remote");
        db.resolve_or_create_chat(&a, &b, "Amara").unwrap();

        // A racing creator that skipped the lookup hits the unique index.
        let err = db.conn().execute(
            "INSERT INTO chats (name, is_group, last_updated, pair_key)
             VALUES ('dup', 0, '2026-01-01T00:00:00+00:00', ?1)",
            params![pair_key(&a, &b)],
        );
        assert!(matches!(err, Err(ref e) if is_constraint_violation(e)));
    }

    #[test]
    fn delete_chat_removes_all_owned_rows() {
        let mut db = db();
        let a = PublicId::from("u-local");
        let b = PublicId::from("u-remote");
        let chat_id = db.resolve_or_create_chat(&a, &b, "Amara").unwrap();

        let msg = db
            .append_message(
                &crate::models::NewMessage::outgoing(chat_id, "photo incoming"),
                &[crate::models::NewAttachment {
                    source: "file:///tmp/a.jpg".into(),
                    public_id: None,
                }],
            )
            .unwrap();
        assert!(msg.id > 0);

        assert!(db.delete_chat(chat_id).unwrap());

        for table in ["messages", "media_files", "chat_participants", "chats"] {
            let count: i64 = db
                .conn()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{table} should be empty");
        }
    }

    #[test]
    fn delete_unknown_chat_reports_false() {
        let mut db = db();
        assert!(!db.delete_chat(4242).unwrap());
    }
}
