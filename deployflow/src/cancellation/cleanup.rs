//! Scoped cleanup guard.
//!
//! Used wherever an acquired resource must be released when a scope exits
//! regardless of outcome, most notably the ephemeral tunnel opened during
//! health verification: its lifetime must never outlive the stage that
//! created it.

use tracing::debug;

/// Runs a cleanup action when dropped, unless disarmed.
pub struct CleanupGuard<F: FnOnce()> {
    action: Option<F>,
    name: String,
}

impl<F: FnOnce()> CleanupGuard<F> {
    /// Creates a new guard around a cleanup action.
    #[must_use]
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            action: Some(action),
            name: name.into(),
        }
    }

    /// Runs the cleanup now instead of at drop.
    pub fn release(mut self) {
        if let Some(action) = self.action.take() {
            debug!(guard = %self.name, "running scoped cleanup");
            action();
        }
    }

    /// Disarms the guard; the cleanup will not run.
    pub fn disarm(mut self) {
        self.action.take();
    }
}

impl<F: FnOnce()> Drop for CleanupGuard<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            debug!(guard = %self.name, "running scoped cleanup on drop");
            action();
        }
    }
}

impl<F: FnOnce()> std::fmt::Debug for CleanupGuard<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupGuard")
            .field("name", &self.name)
            .field("armed", &self.action.is_some())
            .finish()
    }
}
