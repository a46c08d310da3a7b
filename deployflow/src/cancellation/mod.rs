//! Cooperative cancellation and scoped cleanup.
//!
//! An operator abort is observed by the driver between stages and treated
//! as the failure path: rollback of already-succeeded stages, then a
//! non-zero exit.

mod cleanup;
mod token;

pub use cleanup::CleanupGuard;
pub use token::{CancelCallback, CancellationToken};
