//! FocusGate Control Surface
//!
//! Message-passing façade between the sync engine and UI collaborators
//! (settings page, popup, block notice). Every request carries its own
//! reply channel and resolves asynchronously.

mod message;
mod surface;

pub use message::{ControlRequest, DomainListing, SyncOutcome};
pub use surface::{ControlError, ControlSurface};
