//! # courier-shared
//!
//! Domain types shared between the Courier store and sync crates: the
//! server-assigned public identity, phone-number normalization, and the
//! explicit session object that replaces process-global auth state.

pub mod phone;
pub mod session;
pub mod types;

pub use phone::DialPlan;
pub use session::Session;
pub use types::{DeliveryStatus, PublicId};
