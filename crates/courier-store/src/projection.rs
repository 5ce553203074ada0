//! Read-side chat-list projection.
//!
//! The chat list shows only conversations that have ever carried a message
//! (a resolved-but-silent chat stays invisible), most recent activity first.
//! Consumers pair [`Database::list_chats_with_activity`] with
//! [`Database::subscribe_chats`]: take a snapshot, then re-query whenever
//! the revision ticks.

use chrono::{DateTime, Utc};
use courier_shared::PublicId;
use serde::{Deserialize, Serialize};

use crate::chats::parse_timestamp;
use crate::database::Database;
use crate::error::Result;

/// One row of the chat list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub last_message: String,
    pub last_timestamp: DateTime<Utc>,
    pub unread_count: i64,
}

impl Database {
    /// Chats with at least one message, ordered by last activity descending.
    pub fn list_chats_with_activity(&self) -> Result<Vec<ChatSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, image_url, last_message, last_timestamp, unread_count
             FROM chats
             WHERE last_message IS NOT NULL
             ORDER BY last_timestamp DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ChatSummary {
                chat_id: row.get(0)?,
                name: row.get(1)?,
                image_url: row.get(2)?,
                last_message: row.get(3)?,
                last_timestamp: parse_timestamp(row, 4)?,
                unread_count: row.get(5)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Participant public ids for each chat in the list, resolved in one
    /// joined query.  Used by the UI to map a summary back to its contact.
    pub fn list_chats_with_participants(&self) -> Result<Vec<(i64, PublicId)>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, p.contact_public_id
             FROM chats c
             LEFT JOIN chat_participants p ON p.chat_id = c.id
             ORDER BY c.id ASC, p.id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, PublicId(row.get(1)?)))
        })?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }
}
