//! The reconciliation pass.
//!
//! `reconcile` brings three views of "who do I know" into agreement: the
//! device phone book, the local contact cache, and the remote directory.
//! It is idempotent and safe to re-run at any time; a pass that fails
//! halfway leaves convergent state for the next one.
//!
//! Sub-steps are not one transaction.  Renames land before any network call
//! and stay landed even when the directory is unreachable; a failed remote
//! batch is dropped for the pass and re-attempted on the next run.

use std::collections::{HashMap, HashSet};

use courier_shared::session::NotSignedIn;
use courier_shared::{DialPlan, PublicId, Session};
use courier_store::Database;

use crate::directory::{ContactCard, DirectoryClient};
use crate::phonebook::{PhoneBook, PhoneBookEntry, PhoneBookError};

/// What one pass did.  All counters are zero when the phone book was
/// inaccessible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Whether contacts permission was granted this pass.
    pub phone_book_granted: bool,
    /// Cached contacts whose display name was updated in place.
    pub renamed: usize,
    /// New contacts inserted from the directory response.
    pub added: usize,
    /// Cached contacts whose avatar URL changed.
    pub avatars_refreshed: usize,
    /// Phone-book numbers discarded as invalid or foreign.
    pub invalid_dropped: usize,
}

/// Drives reconciliation between phone book, contact cache and directory.
pub struct Reconciler<C> {
    client: C,
    plan: DialPlan,
}

impl<C: DirectoryClient> Reconciler<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            plan: DialPlan::default(),
        }
    }

    pub fn with_dial_plan(client: C, plan: DialPlan) -> Self {
        Self { client, plan }
    }

    /// Run one reconciliation pass.
    ///
    /// Fails only when no user is signed in; everything else is absorbed:
    /// permission denial ends the pass with zero writes, remote failures
    /// are logged and dropped.
    pub async fn reconcile(
        &self,
        session: &Session,
        db: &Database,
        phone_book: &impl PhoneBook,
    ) -> Result<ReconcileReport, NotSignedIn> {
        session.current_user()?;

        let mut report = ReconcileReport::default();

        let raw = match phone_book.entries() {
            Ok(entries) => entries,
            Err(PhoneBookError::PermissionDenied) => {
                tracing::debug!("phone book access denied, skipping reconciliation");
                return Ok(report);
            }
        };
        report.phone_book_granted = true;

        let cards = self.normalize(&raw, &mut report);

        let local = match db.list_contacts() {
            Ok(contacts) => contacts,
            Err(e) => {
                tracing::error!(error = %e, "could not load contact cache");
                return Ok(report);
            }
        };
        let by_phone: HashMap<&str, &courier_store::Contact> =
            local.iter().map(|c| (c.phone.as_str(), c)).collect();

        // Rename pass: phone book wins on display names.  Applied before any
        // network traffic and never rolled back.
        for card in &cards {
            if let Some(existing) = by_phone.get(card.phone.as_str()) {
                if existing.name != card.name {
                    match db.rename_contact(&card.phone, &card.name) {
                        Ok(true) => report.renamed += 1,
                        Ok(false) => {}
                        Err(e) => tracing::warn!(phone = %card.phone, error = %e, "rename failed"),
                    }
                }
            }
        }

        // Numbers the cache has never seen go to the directory as one batch.
        let unsynced: Vec<ContactCard> = cards
            .iter()
            .filter(|card| !by_phone.contains_key(card.phone.as_str()))
            .cloned()
            .collect();
        if !unsynced.is_empty() {
            match self.client.sync_contacts(&unsynced).await {
                Ok(accepted) => {
                    for entry in accepted {
                        let inserted = db.insert_contact(
                            &entry.name,
                            &entry.phone,
                            Some(&entry.public_id),
                            entry.image_url.as_deref(),
                        );
                        match inserted {
                            Ok(_) => report.added += 1,
                            Err(e) => {
                                tracing::warn!(phone = %entry.phone, error = %e, "skipping directory entry")
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        batch = unsynced.len(),
                        error = %e,
                        "contact sync failed, dropping batch for this pass"
                    );
                }
            }
        }

        // Avatar refresh for contacts the directory already knows.
        let known: Vec<PublicId> = local.iter().filter_map(|c| c.public_id.clone()).collect();
        if !known.is_empty() {
            match self.client.refresh_avatars(&known).await {
                Ok(updates) => {
                    for update in updates {
                        match db.update_contact_avatar(&update.public_id, update.image_url.as_deref())
                        {
                            Ok(true) => report.avatars_refreshed += 1,
                            Ok(false) => {}
                            Err(e) => {
                                tracing::warn!(public_id = %update.public_id, error = %e, "avatar update failed")
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "avatar refresh failed"),
            }
        }

        tracing::info!(
            renamed = report.renamed,
            added = report.added,
            avatars_refreshed = report.avatars_refreshed,
            invalid_dropped = report.invalid_dropped,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    /// Normalize raw phone-book entries into directory cards, dropping
    /// invalid numbers and collapsing duplicates (first card wins).
    fn normalize(&self, raw: &[PhoneBookEntry], report: &mut ReconcileReport) -> Vec<ContactCard> {
        let mut seen = HashSet::new();
        let mut cards = Vec::new();

        for entry in raw {
            for number in &entry.numbers {
                match self.plan.normalize(number) {
                    Some(phone) => {
                        if seen.insert(phone.clone()) {
                            cards.push(ContactCard {
                                name: entry.name.clone(),
                                phone,
                            });
                        }
                    }
                    None => report.invalid_dropped += 1,
                }
            }
        }
        cards
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::directory::{AvatarUpdate, DirectoryEntry, DirectoryError};

    use super::*;

    struct FakePhoneBook {
        result: Result<Vec<PhoneBookEntry>, PhoneBookError>,
    }

    impl FakePhoneBook {
        fn with(entries: Vec<PhoneBookEntry>) -> Self {
            Self {
                result: Ok(entries),
            }
        }

        fn denied() -> Self {
            Self {
                result: Err(PhoneBookError::PermissionDenied),
            }
        }
    }

    impl PhoneBook for FakePhoneBook {
        fn entries(&self) -> Result<Vec<PhoneBookEntry>, PhoneBookError> {
            self.result.clone()
        }
    }

    /// Echoes submitted cards back with `pid-<phone>` identities and records
    /// every batch it sees.
    #[derive(Default)]
    struct FakeDirectory {
        sync_batches: Mutex<Vec<Vec<ContactCard>>>,
        refresh_batches: Mutex<Vec<Vec<PublicId>>>,
        avatar_updates: Vec<AvatarUpdate>,
        fail_sync: bool,
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn sync_contacts(
            &self,
            batch: &[ContactCard],
        ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
            self.sync_batches.lock().unwrap().push(batch.to_vec());
            if self.fail_sync {
                return Err(DirectoryError::Status(
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
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
            public_ids: &[PublicId],
        ) -> Result<Vec<AvatarUpdate>, DirectoryError> {
            self.refresh_batches.lock().unwrap().push(public_ids.to_vec());
            Ok(self.avatar_updates.clone())
        }
    }

    fn session() -> Session {
        Session::signed_in(PublicId::from("u-me"), Some("jwt".into()))
    }

    fn contact_count(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn first_pass_registers_all_valid_numbers() {
        let db = Database::open_in_memory().unwrap();
        let reconciler = Reconciler::new(FakeDirectory::default());
        let phone_book = FakePhoneBook::with(vec![
            PhoneBookEntry::new("Amara", ["+94712345678"]),
            PhoneBookEntry::new("Pizza hotline", ["12345"]),
        ]);

        let report = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();

        assert!(report.phone_book_granted);
        assert_eq!(report.added, 1);
        assert_eq!(report.invalid_dropped, 1);

        let contact = db.contact_by_phone("0712345678").unwrap();
        assert_eq!(contact.name, "Amara");
        assert_eq!(contact.public_id, Some(PublicId::from("pid-0712345678")));
    }

    #[tokio::test]
    async fn second_pass_is_convergent() {
        let db = Database::open_in_memory().unwrap();
        let reconciler = Reconciler::new(FakeDirectory::default());
        let phone_book = FakePhoneBook::with(vec![
            PhoneBookEntry::new("Amara", ["0712345678"]),
            PhoneBookEntry::new("Bimal", ["0723456789"]),
        ]);

        let first = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();
        assert_eq!(first.added, 2);

        let second = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.renamed, 0);
        assert_eq!(contact_count(&db), 2);

        // Nothing new to register, so no second sync batch went out.
        assert_eq!(reconciler.client.sync_batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn phone_book_rename_updates_cache_in_place() {
        let db = Database::open_in_memory().unwrap();
        db.insert_contact("Amara", "0712345678", Some(&PublicId::from("u-1")), None)
            .unwrap();

        let reconciler = Reconciler::new(FakeDirectory::default());
        let phone_book = FakePhoneBook::with(vec![PhoneBookEntry::new(
            "Amara Perera",
            ["0712345678"],
        )]);

        let report = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();

        assert_eq!(report.renamed, 1);
        let contact = db.contact_by_phone("0712345678").unwrap();
        assert_eq!(contact.name, "Amara Perera");
        assert_eq!(contact.public_id, Some(PublicId::from("u-1")));
    }

    #[tokio::test]
    async fn remote_failure_keeps_local_renames() {
        let db = Database::open_in_memory().unwrap();
        db.insert_contact("Amara", "0712345678", Some(&PublicId::from("u-1")), None)
            .unwrap();

        let reconciler = Reconciler::new(FakeDirectory {
            fail_sync: true,
            ..FakeDirectory::default()
        });
        let phone_book = FakePhoneBook::with(vec![
            PhoneBookEntry::new("Amara Perera", ["0712345678"]),
            PhoneBookEntry::new("Chatura", ["0734567890"]),
        ]);

        let report = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();

        // The rename landed before the failed batch and stays landed.
        assert_eq!(report.renamed, 1);
        assert_eq!(report.added, 0);
        assert_eq!(contact_count(&db), 1);
        assert_eq!(
            db.contact_by_phone("0712345678").unwrap().name,
            "Amara Perera"
        );
    }

    #[tokio::test]
    async fn permission_denied_makes_no_writes_and_no_calls() {
        let db = Database::open_in_memory().unwrap();
        let reconciler = Reconciler::new(FakeDirectory::default());

        let report = reconciler
            .reconcile(&session(), &db, &FakePhoneBook::denied())
            .await
            .unwrap();

        assert!(!report.phone_book_granted);
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(contact_count(&db), 0);
        assert!(reconciler.client.sync_batches.lock().unwrap().is_empty());
        assert!(reconciler.client.refresh_batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_session_fails_up_front() {
        let db = Database::open_in_memory().unwrap();
        let reconciler = Reconciler::new(FakeDirectory::default());
        let phone_book = FakePhoneBook::with(vec![PhoneBookEntry::new("Amara", ["0712345678"])]);

        let result = reconciler
            .reconcile(&Session::anonymous(), &db, &phone_book)
            .await;

        assert_eq!(result, Err(NotSignedIn));
        assert_eq!(contact_count(&db), 0);
    }

    #[tokio::test]
    async fn avatar_refresh_updates_known_contacts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_contact("Amara", "0712345678", Some(&PublicId::from("u-1")), None)
            .unwrap();
        db.insert_contact("Unsynced", "0723456789", None, None).unwrap();

        let reconciler = Reconciler::new(FakeDirectory {
            avatar_updates: vec![AvatarUpdate {
                public_id: PublicId::from("u-1"),
                image_url: Some("https://cdn/a-new.png".into()),
            }],
            ..FakeDirectory::default()
        });
        let phone_book = FakePhoneBook::with(vec![
            PhoneBookEntry::new("Amara", ["0712345678"]),
            PhoneBookEntry::new("Unsynced", ["0723456789"]),
        ]);

        let report = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();

        assert_eq!(report.avatars_refreshed, 1);
        assert_eq!(
            db.contact_by_phone("0712345678").unwrap().image_url.as_deref(),
            Some("https://cdn/a-new.png")
        );

        // Only contacts holding a public id were asked about.
        let refreshes = reconciler.client.refresh_batches.lock().unwrap();
        assert_eq!(*refreshes, vec![vec![PublicId::from("u-1")]]);
    }

    #[tokio::test]
    async fn duplicate_numbers_submit_once() {
        let db = Database::open_in_memory().unwrap();
        let reconciler = Reconciler::new(FakeDirectory::default());
        let phone_book = FakePhoneBook::with(vec![
            PhoneBookEntry::new("Amara mobile", ["+94712345678"]),
            PhoneBookEntry::new("Amara", ["0712345678", "712345678"]),
        ]);

        let report = reconciler
            .reconcile(&session(), &db, &phone_book)
            .await
            .unwrap();

        assert_eq!(report.added, 1);
        let batches = reconciler.client.sync_batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].phone, "0712345678");
    }
}
