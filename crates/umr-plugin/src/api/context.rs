//! Plugin context: the isolated facade a plugin uses to reach the host.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use umr_core::config::PluginManagerConfig;

use super::events::{EventEmitter, PluginEvents};
use super::fs::SandboxedFs;
use super::logger::PluginLogger;
use super::services::{HostServices, PluginApi};
use super::storage::{PluginStorage, SharedStore};
use crate::manifest::{PluginManifest, PluginMetadata};
use crate::rules::RuleTable;

/// Per-plugin bundle handed to lifecycle callbacks and hook handlers.
///
/// Created once when the plugin is loaded and reused until it is unloaded.
/// Logger, events and storage are namespaced by plugin id.
#[derive(Clone)]
pub struct PluginContext {
    /// Manifest metadata.
    pub metadata: PluginMetadata,
    /// Effective configuration: schema defaults overlaid with host settings.
    pub config: Value,
    /// Prefixed logger.
    pub logger: PluginLogger,
    /// Namespaced events.
    pub events: PluginEvents,
    /// Namespaced key/value storage.
    pub storage: PluginStorage,
    /// Restricted host API.
    pub api: PluginApi,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.metadata.id)
            .finish()
    }
}

impl PluginContext {
    /// The owning plugin's id.
    pub fn plugin_id(&self) -> &str {
        &self.metadata.id
    }
}

/// Builds contexts over the shared emitter, store and rule table.
#[derive(Debug, Clone)]
pub struct ContextFactory {
    emitter: Arc<EventEmitter>,
    store: Arc<SharedStore>,
    rules: Arc<RuleTable>,
    host: HostServices,
    config: Arc<PluginManagerConfig>,
}

impl ContextFactory {
    /// Creates a factory.
    pub fn new(config: Arc<PluginManagerConfig>, rules: Arc<RuleTable>, host: HostServices) -> Self {
        Self {
            emitter: Arc::new(EventEmitter::new()),
            store: Arc::new(SharedStore::new()),
            rules,
            host,
            config,
        }
    }

    /// The emitter shared by every context.
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// The store shared by every context.
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    /// Builds the context for the plugin described by `manifest` in `dir`.
    pub fn create(&self, manifest: &PluginManifest, dir: &Path) -> PluginContext {
        let id = manifest.metadata.id.as_str();

        let mut config = manifest.config_defaults();
        if let Some(Value::Object(settings)) = self.config.settings_for(id) {
            for (key, value) in settings {
                config.insert(key.clone(), value.clone());
            }
        }

        let fs = SandboxedFs::new(id, dir, &self.config.security);

        debug!(plugin_id = %id, "Created plugin context");

        PluginContext {
            metadata: manifest.metadata.clone(),
            config: Value::Object(config),
            logger: PluginLogger::new(id),
            events: PluginEvents::new(id, Arc::clone(&self.emitter)),
            storage: PluginStorage::new(id, Arc::clone(&self.store)),
            api: PluginApi::new(id, self.host.clone(), Arc::clone(&self.rules), fs),
        }
    }

    /// Drops everything `plugin_id` left in the shared emitter and store.
    pub fn release(&self, plugin_id: &str) {
        let listeners = PluginEvents::new(plugin_id, Arc::clone(&self.emitter)).clear();
        let keys = PluginStorage::new(plugin_id, Arc::clone(&self.store)).clear();
        debug!(plugin_id = %plugin_id, listeners, keys, "Released plugin context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(id: &str) -> PluginManifest {
        serde_json::from_value(json!({
            "metadata": {"id": id, "name": id, "version": "1.0.0"},
            "main": "index.js",
            "configSchema": {"properties": {
                "strict": {"default": false},
                "level": {"default": "warn"}
            }}
        }))
        .unwrap()
    }

    fn factory(config: PluginManagerConfig) -> ContextFactory {
        ContextFactory::new(
            Arc::new(config),
            Arc::new(RuleTable::new()),
            HostServices::default(),
        )
    }

    #[test]
    fn test_config_merges_defaults_and_settings() {
        let mut config = PluginManagerConfig::default();
        config
            .settings
            .insert("a".to_string(), json!({"strict": true, "extra": 1}));
        let factory = factory(config);
        let dir = tempfile::tempdir().unwrap();

        let ctx = factory.create(&manifest("a"), dir.path());
        assert_eq!(ctx.config, json!({"strict": true, "level": "warn", "extra": 1}));

        let other = factory.create(&manifest("b"), dir.path());
        assert_eq!(other.config, json!({"strict": false, "level": "warn"}));
    }

    #[test]
    fn test_release_clears_only_that_plugin() {
        let factory = factory(PluginManagerConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let a = factory.create(&manifest("a"), dir.path());
        let b = factory.create(&manifest("b"), dir.path());

        a.storage.set("k", json!(1));
        b.storage.set("k", json!(2));
        a.events.on("x", |_| {});

        factory.release("a");
        assert!(a.storage.keys().is_empty());
        assert_eq!(a.events.emit("x", &Value::Null), 0);
        assert_eq!(b.storage.get("k"), Some(json!(2)));
    }
}
