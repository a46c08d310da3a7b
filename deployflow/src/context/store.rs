//! The shared key/value store carrying data between stages.

use parking_lot::RwLock;
use std::collections::HashMap;

/// The shared context populated stage-by-stage during a pipeline run.
///
/// Keys are namespaced by producer (e.g. `commit.short`, `registry.url`,
/// `image.tag`). Writes overwrite: later stages always read the latest value.
/// Insertion order is irrelevant for lookup but preserved for diagnostic
/// listing, so operator-facing dumps are stable across runs.
///
/// The store is created empty at pipeline start and discarded at
/// termination; it is never persisted across runs. Secret material must not
/// be written here (see `deploy::SecretString`), which keeps the diagnostic
/// listing safe to log.
#[derive(Debug, Default)]
pub struct StageContext {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    // First-insertion order, for stable diagnostic listing.
    order: Vec<String>,
}

impl StageContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context pre-populated from key/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let ctx = Self::new();
        for (key, value) in pairs {
            ctx.set(key, value);
        }
        ctx
    }

    /// Gets the latest value written for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().values.get(key).cloned()
    }

    /// Checks whether a key has been written.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().values.contains_key(key)
    }

    /// Writes a value, overwriting any earlier write to the same key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let mut inner = self.inner.write();

        if !inner.values.contains_key(&key) {
            inner.order.push(key.clone());
        }
        inner.values.insert(key, value.into());
    }

    /// Merges a stage's output delta into the context.
    pub fn merge<I, K, V>(&self, delta: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in delta {
            self.set(key, value);
        }
    }

    /// Returns all entries in first-insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|k| inner.values.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Returns all keys in first-insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Returns the number of keys written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    /// Returns true if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().values.is_empty()
    }

    /// Renders the context as a JSON object for diagnostic output.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in self.entries() {
            map.insert(key, serde_json::Value::String(value));
        }
        serde_json::Value::Object(map)
    }
}

impl Clone for StageContext {
    fn clone(&self) -> Self {
        let inner = self.inner.read();
        Self {
            inner: RwLock::new(Inner {
                values: inner.values.clone(),
                order: inner.order.clone(),
            }),
        }
    }
}
