//! Device phone-book access seam.
//!
//! The platform side (Contacts framework, content resolver, ...) sits behind
//! [`PhoneBook`] so the reconciler can be driven by a fake in tests.  A
//! denied permission prompt is a normal outcome, not a fault: the
//! reconciler aborts the pass silently with zero writes.

use thiserror::Error;

/// One phone-book card: a display name and its raw numbers, exactly as the
/// platform hands them over (formatting, country prefixes and all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneBookEntry {
    pub name: String,
    pub numbers: Vec<String>,
}

impl PhoneBookEntry {
    pub fn new(name: impl Into<String>, numbers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            numbers: numbers.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhoneBookError {
    /// The user declined (or revoked) contacts access.
    #[error("phone book permission denied")]
    PermissionDenied,
}

/// Read access to the device phone book.
pub trait PhoneBook {
    fn entries(&self) -> Result<Vec<PhoneBookEntry>, PhoneBookError>;
}
