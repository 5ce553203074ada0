//! End-to-end walkthrough on an in-memory database: reconcile a small phone
//! book against a canned directory, open a chat, exchange messages, and
//! print the resulting chat list.
//!
//! Run with `cargo run --example reconcile -p courier-sync`.

use async_trait::async_trait;
use tracing_subscriber::{fmt, EnvFilter};

use courier_shared::{PublicId, Session};
use courier_store::{Database, NewMessage};
use courier_sync::{
    AvatarUpdate, ContactCard, DirectoryClient, DirectoryEntry, PhoneBook, PhoneBookEntry,
    PhoneBookError, Reconciler,
};

/// Stand-in for the platform contacts API.
struct DemoPhoneBook;

impl PhoneBook for DemoPhoneBook {
    fn entries(&self) -> Result<Vec<PhoneBookEntry>, PhoneBookError> {
        Ok(vec![
            PhoneBookEntry::new("Amara", ["+94712345678"]),
            PhoneBookEntry::new("Bimal", ["712345679"]),
            PhoneBookEntry::new("Hotline", ["1919"]),
        ])
    }
}

/// Stand-in for the remote directory: accepts everything it is shown.
struct DemoDirectory;

#[async_trait]
impl DirectoryClient for DemoDirectory {
    async fn sync_contacts(
        &self,
        batch: &[ContactCard],
    ) -> Result<Vec<DirectoryEntry>, courier_sync::DirectoryError> {
        Ok(batch
            .iter()
            .map(|card| DirectoryEntry {
                name: card.name.clone(),
                phone: card.phone.clone(),
                public_id: PublicId::new(format!("pid-{}", card.phone)),
                image_url: None,
            })
            .collect())
    }

    async fn refresh_avatars(
        &self,
        _public_ids: &[PublicId],
    ) -> Result<Vec<AvatarUpdate>, courier_sync::DirectoryError> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courier_sync=debug,courier_store=debug,info"));
    fmt().with_env_filter(filter).init();

    let mut db = Database::open_in_memory()?;
    let session = Session::signed_in(PublicId::from("u-me"), None);

    let reconciler = Reconciler::new(DemoDirectory);
    let report = reconciler.reconcile(&session, &db, &DemoPhoneBook).await?;
    tracing::info!(?report, "reconciled");

    let amara = db.contact_by_phone("0712345678")?;
    let amara_id = amara.public_id.clone().unwrap();

    let chat_id = db.resolve_or_create_chat(session.current_user()?, &amara_id, &amara.name)?;

    db.append_message(&NewMessage::outgoing(chat_id, "ayubowan!"), &[])?;
    db.append_message(
        &NewMessage::incoming(
            chat_id,
            uuid::Uuid::new_v4(),
            "ayubowan, long time!",
            chrono::Utc::now(),
        ),
        &[],
    )?;

    for summary in db.list_chats_with_activity()? {
        println!(
            "{} — {} ({} unread)",
            summary.name, summary.last_message, summary.unread_count
        );
    }

    Ok(())
}
