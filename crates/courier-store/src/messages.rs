//! The append-only message log and its media attachments.
//!
//! `append_message` is the single write path for conversation content.  It
//! performs three logically-one writes: the message row, its attachment
//! rows, and the owning chat's denormalized summary.  They are deliberately
//! not wrapped in a transaction: the log is append-only and a partially
//! attached message is still a valid message, so a failure mid-way leaves
//! recoverable state and the next successful append corrects the summary.

use chrono::Utc;
use courier_shared::{DeliveryStatus, PublicId};
use rusqlite::params;
use uuid::Uuid;

use crate::chats::parse_timestamp;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{MediaAttachment, Message, NewAttachment, NewMessage, TimelineEntry};

impl Database {
    // ------------------------------------------------------------------
    // Append
    // ------------------------------------------------------------------

    /// Append a message with its attachments to an existing chat and bring
    /// the chat's summary fields up to date.
    ///
    /// Fails with a constraint violation if `new.chat_id` does not exist;
    /// callers resolve the chat first (see
    /// [`Database::resolve_or_create_chat`]).  A received message bumps the
    /// chat's unread count; a sent one does not.
    pub fn append_message(
        &self,
        new: &NewMessage,
        attachments: &[NewAttachment],
    ) -> Result<Message> {
        self.conn().execute(
            "INSERT INTO messages (message_id, body, from_me, timestamp, status, chat_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.message_id.to_string(),
                new.body,
                new.from_me,
                new.timestamp.to_rfc3339(),
                new.status.as_str(),
                new.chat_id,
            ],
        )?;
        let message_row_id = self.conn().last_insert_rowid();

        // The summary update below runs even when an attachment insert fails
        // partway; the message itself is already durable.
        let mut attach_result = Ok(());
        for attachment in attachments {
            if let Err(e) = self.insert_attachment(message_row_id, attachment) {
                tracing::warn!(
                    message_row_id,
                    error = %e,
                    "attachment insert failed, keeping message"
                );
                attach_result = Err(e);
                break;
            }
        }

        let unread_bump = if new.from_me { 0 } else { 1 };
        self.conn().execute(
            "UPDATE chats
             SET last_message = ?2,
                 last_timestamp = ?3,
                 last_updated = ?4,
                 unread_count = unread_count + ?5
             WHERE id = ?1",
            params![
                new.chat_id,
                new.body,
                new.timestamp.to_rfc3339(),
                Utc::now().to_rfc3339(),
                unread_bump,
            ],
        )?;
        self.notify_chats_changed();

        attach_result?;

        Ok(Message {
            id: message_row_id,
            message_id: new.message_id,
            msg_pub_id: None,
            body: new.body.clone(),
            from_me: new.from_me,
            timestamp: new.timestamp,
            status: new.status.clone(),
            chat_id: new.chat_id,
        })
    }

    fn insert_attachment(&self, message_row_id: i64, attachment: &NewAttachment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO media_files (source, public_id, message_id)
             VALUES (?1, ?2, ?3)",
            params![
                attachment.source,
                attachment.public_id.as_ref().map(PublicId::as_str),
                message_row_id,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timeline
    // ------------------------------------------------------------------

    /// Full timeline of a chat: messages ascending by timestamp, insertion
    /// order breaking ties, each with its attachments.
    ///
    /// Attachments are fetched one keyed lookup per message.  Fine at
    /// phone-database scale; [`Database::fetch_timeline_batched`] is the
    /// single-query variant for hot paths.
    pub fn fetch_timeline(&self, chat_id: i64) -> Result<Vec<TimelineEntry>> {
        let messages = self.messages_for_chat(chat_id)?;

        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            let attachments = self.attachments_for_message(message.id)?;
            entries.push(TimelineEntry {
                message,
                attachments,
            });
        }
        Ok(entries)
    }

    /// Same result as [`Database::fetch_timeline`], but all attachments are
    /// pulled in one `IN`-query over the chat's message ids.
    pub fn fetch_timeline_batched(&self, chat_id: i64) -> Result<Vec<TimelineEntry>> {
        let messages = self.messages_for_chat(chat_id)?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; messages.len()].join(", ");
        let sql = format!(
            "SELECT id, source, public_id, message_id
             FROM media_files
             WHERE message_id IN ({placeholders})
             ORDER BY message_id ASC, id ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(messages.iter().map(|m| m.id)),
            row_to_attachment,
        )?;

        let mut entries: Vec<TimelineEntry> = messages
            .into_iter()
            .map(|message| TimelineEntry {
                message,
                attachments: Vec::new(),
            })
            .collect();

        for row in rows {
            let attachment = row?;
            if let Some(entry) = entries
                .iter_mut()
                .find(|e| e.message.id == attachment.message_id)
            {
                entry.attachments.push(attachment);
            }
        }
        Ok(entries)
    }

    fn messages_for_chat(&self, chat_id: i64) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, message_id, msg_pub_id, body, from_me, timestamp, status, chat_id
             FROM messages
             WHERE chat_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Attachments of one message, in insertion order.
    pub fn attachments_for_message(&self, message_row_id: i64) -> Result<Vec<MediaAttachment>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, source, public_id, message_id
             FROM media_files
             WHERE message_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![message_row_id], row_to_attachment)?;

        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row?);
        }
        Ok(attachments)
    }

    /// Look a message up by its client-generated id (ack matching).
    pub fn message_by_client_id(&self, message_id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, message_id, msg_pub_id, body, from_me, timestamp, status, chat_id
                 FROM messages
                 WHERE message_id = ?1",
                params![message_id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Delivery lifecycle
    // ------------------------------------------------------------------

    /// Advance the delivery status of a message.  Returns `true` if a row
    /// changed.
    pub fn update_message_status(&self, message_id: Uuid, status: &DeliveryStatus) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET status = ?2 WHERE message_id = ?1",
            params![message_id.to_string(), status.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Record the server-assigned id once a send is acked.
    pub fn set_message_public_id(&self, message_id: Uuid, pub_id: &PublicId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET msg_pub_id = ?2 WHERE message_id = ?1",
            params![message_id.to_string(), pub_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Reset a chat's unread count after the user has viewed it.
    pub fn mark_chat_read(&self, chat_id: i64) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE chats SET unread_count = 0 WHERE id = ?1 AND unread_count <> 0",
            params![chat_id],
        )?;
        if affected > 0 {
            self.notify_chats_changed();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let message_id_str: String = row.get(1)?;
    let message_id = Uuid::parse_str(&message_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status_str: String = row.get(6)?;

    Ok(Message {
        id: row.get(0)?,
        message_id,
        msg_pub_id: row.get::<_, Option<String>>(2)?.map(PublicId),
        body: row.get(3)?,
        from_me: row.get(4)?,
        timestamp: parse_timestamp(row, 5)?,
        status: DeliveryStatus::from(status_str.as_str()),
        chat_id: row.get(7)?,
    })
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaAttachment> {
    Ok(MediaAttachment {
        id: row.get(0)?,
        source: row.get(1)?,
        public_id: row.get::<_, Option<String>>(2)?.map(PublicId),
        message_id: row.get(3)?,
    })
}
