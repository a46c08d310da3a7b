//! Context management for pipeline execution.
//!
//! This module provides:
//! - The shared [`StageContext`] key/value store populated stage-by-stage
//! - Resolution with external-configuration fallback
//! - Well-known key constants namespaced by producer

pub mod keys;
mod resolve;
mod store;

pub use resolve::{ContextResolver, ValueSource};
pub use store::StageContext;
