//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `contacts`, `chats`, `chat_participants`,
//! `messages`, and `media_files`.
//!
//! Hard foreign keys run chat -> participant, chat -> message -> media, all
//! cascading.  Contacts are deliberately only soft-referenced from
//! participants via `contact_public_id` / `contact_id`: the contact cache
//! and the chat graph are synchronized independently, so deleting a contact
//! must not rip through existing chats.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Contacts (local cache of the remote directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    phone     TEXT NOT NULL UNIQUE,     -- canonical national form, 0XXXXXXXXX
    public_id TEXT,                     -- NULL until the directory assigns one
    image_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_contacts_public_id ON contacts(public_id);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT NOT NULL,
    public_chat_id TEXT,
    image_url      TEXT,
    is_group       INTEGER NOT NULL DEFAULT 0,  -- reserved, no group writer yet
    last_message   TEXT,                        -- denormalized from messages
    last_timestamp TEXT,                        -- RFC 3339, denormalized
    last_updated   TEXT NOT NULL,
    unread_count   INTEGER NOT NULL DEFAULT 0,
    pair_key       TEXT UNIQUE                  -- sorted participant pair, NULL for groups
);

CREATE INDEX IF NOT EXISTS idx_chats_last_timestamp ON chats(last_timestamp DESC);

-- ----------------------------------------------------------------
-- Chat participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_participants (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    contact_public_id TEXT NOT NULL,
    contact_id        INTEGER,                  -- soft ref into contacts, nullable
    chat_id           INTEGER NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_public_id ON chat_participants(contact_public_id);
CREATE INDEX IF NOT EXISTS idx_participants_chat ON chat_participants(chat_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,                   -- client-generated UUID v4
    msg_pub_id TEXT,                            -- server-assigned after ack
    body       TEXT NOT NULL,
    from_me    INTEGER NOT NULL,                -- boolean 0/1
    timestamp  TEXT NOT NULL,                   -- RFC 3339
    status     TEXT NOT NULL,                   -- pending/sent/delivered/failed/...
    chat_id    INTEGER NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, timestamp);
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id);

-- ----------------------------------------------------------------
-- Media attachments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS media_files (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    source     TEXT NOT NULL,                   -- local URI or remote blob ref
    public_id  TEXT,
    message_id INTEGER NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_media_message ON media_files(message_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
