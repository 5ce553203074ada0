//! # courier-store
//!
//! Local chat-state persistence for the Courier application, backed by
//! SQLite.  The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed helpers for every domain model:
//! contacts cached from the remote directory, canonical one-to-one chats,
//! the append-only message log with its media attachments, and the
//! chat-list projection.
//!
//! Writes to the chat table publish a revision tick over a `tokio::sync::watch`
//! channel after they are durable, so read-side consumers can re-query on
//! change instead of polling.

pub mod chats;
pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod projection;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use projection::ChatSummary;
