//! Authenticated session state.
//!
//! The original client kept the signed-in user's identity in a process-wide
//! store; here it is an explicit value handed to the components that need
//! it.  A [`Session`] may exist before sign-in completes, in which case the
//! public id is absent and identity-dependent operations fail up front.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PublicId;

/// Current-user state injected into the reconciler and chat resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    user_public_id: Option<PublicId>,
    bearer_token: Option<String>,
}

/// Raised when an operation needs a signed-in identity and none is present.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no signed-in user in session")]
pub struct NotSignedIn;

impl Session {
    /// Session for a signed-in user.
    pub fn signed_in(user_public_id: PublicId, bearer_token: Option<String>) -> Self {
        Self {
            user_public_id: Some(user_public_id),
            bearer_token,
        }
    }

    /// Session before sign-in completes.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The signed-in user's public id, or [`NotSignedIn`].
    pub fn current_user(&self) -> Result<&PublicId, NotSignedIn> {
        self.user_public_id.as_ref().ok_or(NotSignedIn)
    }

    /// Bearer token for remote calls, if one was issued.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}
