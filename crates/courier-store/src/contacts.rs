//! CRUD operations for [`Contact`] records.
//!
//! These are the primitives the directory reconciler drives: insert rows for
//! directory-accepted numbers, rename in place when the phone book changes,
//! refresh avatar URLs.  Contacts are never deleted in normal operation; the
//! table mirrors the device phone book.

use courier_shared::PublicId;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Contact;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a contact returned by the remote directory.  Returns the new
    /// local row id.
    pub fn insert_contact(
        &self,
        name: &str,
        phone: &str,
        public_id: Option<&PublicId>,
        image_url: Option<&str>,
    ) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO contacts (name, phone, public_id, image_url)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, phone, public_id.map(PublicId::as_str), image_url],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Load the full contact cache, ordered by name.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, phone, public_id, image_url
             FROM contacts
             ORDER BY name ASC",
        )?;

        let rows = stmt.query_map([], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Fetch a single contact by its canonical phone number.
    pub fn contact_by_phone(&self, phone: &str) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT id, name, phone, public_id, image_url
                 FROM contacts
                 WHERE phone = ?1",
                params![phone],
                row_to_contact,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Rename the contact cached under `phone`.  The directory-assigned
    /// public id is never touched by this path.  Returns `true` if a row
    /// changed.
    pub fn rename_contact(&self, phone: &str, name: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contacts SET name = ?2 WHERE phone = ?1",
            params![phone, name],
        )?;
        Ok(affected > 0)
    }

    /// Update the avatar URL of the contact holding `public_id`.  Returns
    /// `true` if a row changed.
    pub fn update_contact_avatar(
        &self,
        public_id: &PublicId,
        image_url: Option<&str>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contacts SET image_url = ?2 WHERE public_id = ?1",
            params![public_id.as_str(), image_url],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Contact`].
fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        public_id: row.get::<_, Option<String>>(3)?.map(PublicId),
        image_url: row.get(4)?,
    })
}
