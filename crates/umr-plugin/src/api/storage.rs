//! Shared key/value store and its per-plugin facade.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Host-wide key/value map backing every plugin's storage.
pub type SharedStore = DashMap<String, Value>;

/// Per-plugin view of the shared store.
///
/// Keys are stored as `<plugin id>:<key>`; reads, `keys` and `clear` only
/// ever see this plugin's prefix.
#[derive(Debug, Clone)]
pub struct PluginStorage {
    prefix: String,
    store: Arc<SharedStore>,
}

impl PluginStorage {
    /// Creates the facade for `plugin_id`.
    pub fn new(plugin_id: &str, store: Arc<SharedStore>) -> Self {
        Self {
            prefix: format!("{plugin_id}:"),
            store,
        }
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.qualify(key)).map(|v| v.value().clone())
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.store.insert(self.qualify(key), value)
    }

    /// Removes `key`, returning its value.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.store.remove(&self.qualify(key)).map(|(_, v)| v)
    }

    /// Whether `key` is set.
    pub fn has(&self, key: &str) -> bool {
        self.store.contains_key(&self.qualify(key))
    }

    /// This plugin's keys with the prefix stripped, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .iter()
            .filter_map(|entry| entry.key().strip_prefix(&self.prefix).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    /// Removes every key of this plugin. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|key, _| !key.starts_with(&self.prefix));
        before - self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespacing() {
        let store = Arc::new(SharedStore::new());
        let a = PluginStorage::new("a", store.clone());
        let b = PluginStorage::new("b", store.clone());

        a.set("k", json!("from a"));
        assert_eq!(b.get("k"), None);
        assert!(!b.has("k"));

        b.set("k", json!("from b"));
        assert_eq!(a.get("k"), Some(json!("from a")));
        assert_eq!(store.get("b:k").unwrap().value(), &json!("from b"));
    }

    #[test]
    fn test_clear_and_keys_are_scoped() {
        let store = Arc::new(SharedStore::new());
        let a = PluginStorage::new("a", store.clone());
        let b = PluginStorage::new("b", store.clone());

        a.set("z", json!(1));
        a.set("y", json!(2));
        b.set("x", json!(3));

        assert_eq!(a.keys(), vec!["y", "z"]);
        assert_eq!(a.clear(), 2);
        assert!(a.keys().is_empty());
        assert_eq!(b.keys(), vec!["x"]);
        assert_eq!(b.delete("x"), Some(json!(3)));
    }
}
