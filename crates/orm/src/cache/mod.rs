//! Version-keyed model cache
//!
//! Fetch results are cached under keys that embed a per-model version
//! counter:
//!
//! ```text
//! <prefix>/model/<model_name>/data_version
//! <prefix>/model/<model_name>/data/<version>/<fingerprint>
//! ```
//!
//! Invalidation bumps the version instead of deleting entries; everything
//! cached under the old version becomes unreachable. That is correct for
//! backends with eviction and must be reconciled out-of-band for backends
//! without it.

pub mod memory;

pub use memory::MemoryCache;

use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::OrmResult;
use crate::fetch::FetchParams;
use crate::model::Model;

/// Durable cache store shared across scopes.
///
/// `add` is conditional on the key being absent. Two scopes racing to
/// populate the same fingerprint must not double-write; plain `put`
/// semantics are not enough for fetch-result population.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Unconditional set.
    fn put(&self, key: &str, value: Value);

    /// Conditional insert: true when the key was absent and is now set.
    fn add(&self, key: &str, value: Value) -> bool;

    /// Atomically increment an integer entry, creating it at 1 when
    /// absent. Returns the new value.
    fn increment(&self, key: &str) -> i64;

    fn forget(&self, key: &str) -> bool;

    fn flush(&self);
}

/// Versioned cache helper owned by one model.
pub struct ModelCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    model_name: String,
}

impl ModelCache {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            model_name: model_name.into(),
        }
    }

    fn version_key(&self) -> String {
        format!("{}/model/{}/data_version", self.prefix, self.model_name)
    }

    /// Current data version, 0 until the first invalidation.
    pub fn version(&self) -> i64 {
        match self.backend.get(&self.version_key()) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            _ => 0,
        }
    }

    /// Entry key for a fetch plan: explicit cache key when the caller set
    /// one, content fingerprint otherwise.
    pub fn entry(&self, params: &FetchParams) -> String {
        let fingerprint = params
            .cache_key
            .clone()
            .unwrap_or_else(|| params.fingerprint());
        format!(
            "{}/model/{}/data/{}/{}",
            self.prefix,
            self.model_name,
            self.version(),
            fingerprint
        )
    }

    pub fn fetch(&self, key: &str) -> Option<Value> {
        let hit = self.backend.get(key);
        debug!(model = %self.model_name, key, hit = hit.is_some(), "cache fetch");
        hit
    }

    /// Race-safe insert; loses quietly when another scope got there first.
    pub fn add(&self, key: &str, value: Value) -> bool {
        self.backend.add(key, value)
    }

    /// Invalidate by bumping the model's version counter. Existing entries
    /// are left in place under the old version.
    pub fn delete(&self) {
        let version = self.backend.increment(&self.version_key());
        debug!(model = %self.model_name, version, "cache version bumped");
    }

    /// Invalidate this model and, one hop out, every directly related
    /// model's cache. Not transitive.
    pub fn delete_all(&self, model: &Rc<Model>) -> OrmResult<()> {
        self.delete();
        for name in model.relation_names() {
            let relationship = model.relationship(&name)?;
            let foreign = relationship.foreign_model()?;
            foreign.cache().delete();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_keys_follow_the_wire_format() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let cache = ModelCache::new(backend, "helios", "author");
        let params = FetchParams::new().cache_key("recent");
        assert_eq!(cache.entry(&params), "helios/model/author/data/0/recent");
    }

    #[test]
    fn delete_bumps_only_the_version_segment() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let cache = ModelCache::new(backend, "helios", "author");
        let params = FetchParams::new();

        let before = cache.entry(&params);
        cache.delete();
        let after = cache.entry(&params);

        assert_ne!(before, after);
        let diff: Vec<(usize, (&str, &str))> = before
            .split('/')
            .zip(after.split('/'))
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .collect();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].1, ("0", "1"));
    }

    #[test]
    fn stale_entries_are_unreachable_after_bump() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let cache = ModelCache::new(Arc::clone(&backend), "helios", "author");
        let params = FetchParams::new();

        let key = cache.entry(&params);
        assert!(cache.add(&key, Value::from(vec![1, 2, 3])));
        cache.delete();
        assert!(cache.fetch(&cache.entry(&params)).is_none());
        // the stale entry still physically exists under the old key
        assert!(backend.get(&key).is_some());
    }
}
