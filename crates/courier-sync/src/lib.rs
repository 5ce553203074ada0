//! # courier-sync
//!
//! Directory reconciliation: diffing the device phone book against the
//! local contact cache and converging both with the remote directory.
//!
//! The pass is best-effort, not transactional.  Local renames apply first
//! and are never rolled back; remote failures are logged and dropped for
//! the pass, to be retried whenever [`Reconciler::reconcile`] runs again
//! (typically on app foreground).

pub mod directory;
pub mod phonebook;
pub mod reconciler;

pub use directory::{
    AvatarUpdate, ContactCard, DirectoryClient, DirectoryEntry, DirectoryError,
    HttpDirectoryClient,
};
pub use phonebook::{PhoneBook, PhoneBookEntry, PhoneBookError};
pub use reconciler::{ReconcileReport, Reconciler};
