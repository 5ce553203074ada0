//! Remote directory endpoints.
//!
//! Two batch calls: `/users/sync-contacts` registers unknown numbers and
//! returns their assigned public ids, `/users/refresh-contact-images`
//! returns changed avatar URLs for already-known ids.  [`DirectoryClient`]
//! is the seam the reconciler is tested through; [`HttpDirectoryClient`] is
//! the production implementation.

use async_trait::async_trait;
use courier_shared::{PublicId, Session};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An entry submitted for registration: the normalized number plus the name
/// it carries in this device's phone book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactCard {
    pub name: String,
    pub phone: String,
}

/// A directory-accepted entry, one-to-one with a submitted [`ContactCard`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub phone: String,
    pub public_id: PublicId,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// A changed avatar reported by the refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvatarUpdate {
    pub public_id: PublicId,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory responded {0}")]
    Status(reqwest::StatusCode),
}

/// Batch operations against the remote directory.
#[async_trait]
pub trait DirectoryClient {
    /// Register a batch of phone-book entries; the response carries one
    /// accepted entry per input, with its assigned public id.
    async fn sync_contacts(
        &self,
        batch: &[ContactCard],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Ask for refreshed avatar URLs; only changed entries come back.
    async fn refresh_avatars(
        &self,
        public_ids: &[PublicId],
    ) -> Result<Vec<AvatarUpdate>, DirectoryError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ContactsEnvelope<T> {
    contacts: Vec<T>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    public_ids: Vec<&'a str>,
}

/// Directory client over HTTPS with the session's bearer token.
pub struct HttpDirectoryClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpDirectoryClient {
    pub fn new(base_url: impl Into<String>, session: &Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: session.bearer_token().map(str::to_owned),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.http.post(url);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn sync_contacts(
        &self,
        batch: &[ContactCard],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let resp = self.post("/users/sync-contacts").json(&batch).send().await?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Status(resp.status()));
        }

        let envelope: ContactsEnvelope<DirectoryEntry> = resp.json().await?;
        Ok(envelope.contacts)
    }

    async fn refresh_avatars(
        &self,
        public_ids: &[PublicId],
    ) -> Result<Vec<AvatarUpdate>, DirectoryError> {
        let request = RefreshRequest {
            public_ids: public_ids.iter().map(PublicId::as_str).collect(),
        };
        let resp = self
            .post("/users/refresh-contact-images")
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Status(resp.status()));
        }

        let envelope: ContactsEnvelope<AvatarUpdate> = resp.json().await?;
        Ok(envelope.contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_entry_wire_format() {
        let json = r#"{
            "name": "Amara",
            "phone": "0712345678",
            "public_id": "u-1",
            "imageUrl": "https://cdn/a.png"
        }"#;
        let entry: DirectoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.public_id, PublicId::from("u-1"));
        assert_eq!(entry.image_url.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn avatar_update_tolerates_cleared_image() {
        let json = r#"{"public_id": "u-1", "imageUrl": null}"#;
        let update: AvatarUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.image_url, None);
    }
}
