//! Pipeline building and execution.
//!
//! This module provides:
//! - The pipeline builder with build-time data-dependency validation
//! - The sequential driver with success/failure hooks
//! - The bounded retry wrapper
//! - Compensation execution in reverse completion order

mod builder;
mod driver;
mod retry;
mod rollback;

pub use builder::PipelineBuilder;
pub use driver::{NoOpHooks, Pipeline, PipelineHooks};
pub use retry::{execute_with_retry, Backoff, Jitter, RetryPolicy, RetryResult};
pub use rollback::run_rollback;
