//! In-memory cache backend
//!
//! Process-local backend on a concurrent map. Suitable for tests and for
//! single-process deployments; per-key entry locks make `add` and
//! `increment` atomic with respect to concurrent scopes.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use super::CacheBackend;

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Value>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn add(&self, key: &str, value: Value) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    fn increment(&self, key: &str) -> i64 {
        let mut entry = self.entries.entry(key.to_string()).or_insert(Value::from(0));
        let next = entry.value().as_i64().unwrap_or(0) + 1;
        *entry.value_mut() = Value::from(next);
        next
    }

    fn forget(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn flush(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_succeeds_only_when_absent() {
        let cache = MemoryCache::new();
        assert!(cache.add("k", Value::from("first")));
        assert!(!cache.add("k", Value::from("second")));
        assert_eq!(cache.get("k"), Some(Value::from("first")));
    }

    #[test]
    fn increment_counts_from_one() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("v"), 1);
        assert_eq!(cache.increment("v"), 2);
        assert_eq!(cache.get("v"), Some(Value::from(2)));
    }

    #[test]
    fn forget_reports_presence() {
        let cache = MemoryCache::new();
        cache.put("k", Value::from(1));
        assert!(cache.forget("k"));
        assert!(!cache.forget("k"));
    }
}
