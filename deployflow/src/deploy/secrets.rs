//! Credential store boundary.
//!
//! Secrets are resolved at stage-execution time and handed to collaborators
//! directly; they are never written into the shared context, and the
//! wrapper type redacts itself in all text output so a context dump or a
//! debug log cannot leak credentials.

use async_trait::async_trait;

/// A secret value that redacts itself in `Debug` and `Display`.
///
/// The inner value is only reachable through [`SecretString::expose`],
/// which keeps accidental logging greppable.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretString(***)")
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The credential store boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolves a named secret.
    async fn resolve(&self, name: &str) -> anyhow::Result<SecretString>;
}
