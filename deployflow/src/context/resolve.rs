//! Context value resolution with external-configuration fallback.

use super::StageContext;
use crate::config::ExternalConfig;
use crate::errors::MissingContextValue;

/// Resolves context values with a strict precedence order.
///
/// A key resolves to the value an earlier stage wrote into the context; if
/// none exists, to the operator-supplied fallback from [`ExternalConfig`];
/// if neither is present, resolution fails with [`MissingContextValue`]
/// naming the key and the requiring stage.
///
/// Resolution is a pure lookup with no side effects, so a pipeline behaves
/// identically across runs given the same context and configuration.
#[derive(Debug, Clone, Copy)]
pub struct ContextResolver<'a> {
    context: &'a StageContext,
    config: &'a ExternalConfig,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Written by an earlier stage.
    Context,
    /// Supplied as an operator fallback.
    Fallback,
}

impl<'a> ContextResolver<'a> {
    /// Creates a resolver over a context and external configuration.
    #[must_use]
    pub fn new(context: &'a StageContext, config: &'a ExternalConfig) -> Self {
        Self { context, config }
    }

    /// Resolves a required key, failing if neither source has it.
    ///
    /// # Errors
    ///
    /// Returns [`MissingContextValue`] naming `key` and `stage` when the key
    /// was never written and no fallback is configured.
    pub fn require(&self, key: &str, stage: &str) -> Result<(String, ValueSource), MissingContextValue> {
        if let Some(value) = self.context.get(key) {
            return Ok((value, ValueSource::Context));
        }
        if let Some(value) = self.config.fallback(key) {
            return Ok((value.to_string(), ValueSource::Fallback));
        }
        Err(MissingContextValue::new(key, stage))
    }

    /// Resolves an optional key, returning `None` when absent everywhere.
    #[must_use]
    pub fn optional(&self, key: &str) -> Option<String> {
        self.context
            .get(key)
            .or_else(|| self.config.fallback(key).map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_value_wins_over_fallback() {
        let ctx = StageContext::new();
        ctx.set("registry.url", "from-provisioner.example.com");
        let config =
            ExternalConfig::new().with_fallback("registry.url", "operator.example.com");

        let resolver = ContextResolver::new(&ctx, &config);
        let (value, source) = resolver.require("registry.url", "push-image").unwrap();

        assert_eq!(value, "from-provisioner.example.com");
        assert_eq!(source, ValueSource::Context);
    }

    #[test]
    fn test_fallback_used_when_context_missing() {
        let ctx = StageContext::new();
        let config =
            ExternalConfig::new().with_fallback("registry.url", "operator.example.com");

        let resolver = ContextResolver::new(&ctx, &config);
        let (value, source) = resolver.require("registry.url", "push-image").unwrap();

        assert_eq!(value, "operator.example.com");
        assert_eq!(source, ValueSource::Fallback);
    }

    #[test]
    fn test_missing_everywhere_is_an_error() {
        let ctx = StageContext::new();
        let config = ExternalConfig::new();

        let resolver = ContextResolver::new(&ctx, &config);
        let err = resolver.require("registry.url", "push-image").unwrap_err();

        assert_eq!(err.key, "registry.url");
        assert_eq!(err.stage, "push-image");
    }

    #[test]
    fn test_optional_resolution() {
        let ctx = StageContext::new();
        let config = ExternalConfig::new().with_fallback("cluster.endpoint", "10.0.0.1");

        let resolver = ContextResolver::new(&ctx, &config);

        assert_eq!(resolver.optional("cluster.endpoint"), Some("10.0.0.1".to_string()));
        assert_eq!(resolver.optional("image.tag"), None);
    }

    #[test]
    fn test_resolution_is_pure() {
        let ctx = StageContext::new();
        let config = ExternalConfig::new().with_fallback("registry.url", "reg.example.com");
        let resolver = ContextResolver::new(&ctx, &config);

        let first = resolver.require("registry.url", "push-image").unwrap();
        let second = resolver.require("registry.url", "push-image").unwrap();

        assert_eq!(first, second);
        // Fallback resolution must not write through to the context.
        assert!(!ctx.contains_key("registry.url"));
    }
}
