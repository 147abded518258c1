//! Hook registry: plugins register handlers by hook event with priority ordering.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use umr_core::result::AppResult;

use super::definitions::{HookEvent, HookOutcome};
use crate::api::context::PluginContext;

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles a hook invocation.
    ///
    /// Receives the payload as left by the previous handler and the owning
    /// plugin's context. An `Err` is logged by the dispatcher and the chain
    /// continues with the payload unchanged.
    async fn handle(&self, data: Value, ctx: &PluginContext) -> AppResult<HookOutcome>;
}

/// One handler attached to one event.
#[derive(Debug, Clone)]
pub struct HookRegistration {
    /// Plugin that registered this handler.
    pub plugin_id: String,
    /// Event the handler is attached to.
    pub event: HookEvent,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
    /// Priority (higher = earlier execution).
    pub priority: i32,
    /// Context of the owning plugin, passed to every invocation.
    pub context: PluginContext,
}

/// Registry of hook handlers organized by hook event.
#[derive(Debug)]
pub struct HookRegistry {
    /// Hook event → handlers sorted by descending priority.
    handlers: RwLock<HashMap<HookEvent, Vec<HookRegistration>>>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a registration to its event's table.
    pub async fn register(&self, registration: HookRegistration) {
        let event = registration.event;
        let plugin_id = registration.plugin_id.clone();
        let priority = registration.priority;

        let mut handlers = self.handlers.write().await;
        let entries = handlers.entry(event).or_default();

        entries.push(registration);

        // Stable sort: equal priorities keep registration order
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!(
            hook = %event,
            plugin_id = %plugin_id,
            priority = priority,
            "Hook handler registered"
        );
    }

    /// Unregisters all handlers for a specific plugin.
    ///
    /// Returns the number of registrations removed.
    pub async fn unregister_plugin(&self, plugin_id: &str) -> usize {
        let mut handlers = self.handlers.write().await;
        let mut removed = 0;

        for entries in handlers.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.plugin_id != plugin_id);
            removed += before - entries.len();
        }

        // Remove empty hook entries
        handlers.retain(|_, entries| !entries.is_empty());

        debug!(plugin_id = %plugin_id, removed, "Hooks unregistered for plugin");
        removed
    }

    /// Returns all registrations for a hook event, in dispatch order.
    pub async fn get_handlers(&self, event: HookEvent) -> Vec<HookRegistration> {
        let handlers = self.handlers.read().await;
        handlers.get(&event).cloned().unwrap_or_default()
    }

    /// Returns whether any handlers are registered for a hook event.
    pub async fn has_handlers(&self, event: HookEvent) -> bool {
        let handlers = self.handlers.read().await;
        handlers
            .get(&event)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    /// Returns the number of handlers registered for a hook event.
    pub async fn handler_count(&self, event: HookEvent) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(&event).map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns the number of handlers a plugin has across all events.
    pub async fn plugin_handler_count(&self, plugin_id: &str) -> usize {
        let handlers = self.handlers.read().await;
        handlers
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|e| e.plugin_id == plugin_id)
            .count()
    }

    /// Returns all hook events with at least one handler.
    pub async fn registered_hooks(&self) -> Vec<HookEvent> {
        let handlers = self.handlers.read().await;
        handlers.keys().copied().collect()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::ContextFactory;
    use crate::api::services::HostServices;
    use crate::manifest::{PluginManifest, PluginMetadata};
    use crate::rules::RuleTable;
    use umr_core::config::PluginManagerConfig;

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl HookHandler for Noop {
        async fn handle(&self, _data: Value, _ctx: &PluginContext) -> AppResult<HookOutcome> {
            Ok(HookOutcome::pass())
        }
    }

    fn registration(factory: &ContextFactory, id: &str, event: HookEvent, priority: i32) -> HookRegistration {
        let manifest = PluginManifest {
            metadata: PluginMetadata::new(id, id, "1"),
            ..Default::default()
        };
        HookRegistration {
            plugin_id: id.to_string(),
            event,
            handler: Arc::new(Noop),
            priority,
            context: factory.create(&manifest, &std::env::temp_dir()),
        }
    }

    #[tokio::test]
    async fn test_unregister_is_exact_match() {
        let factory = ContextFactory::new(
            Arc::new(PluginManagerConfig::default()),
            Arc::new(RuleTable::new()),
            HostServices::default(),
        );
        let registry = HookRegistry::new();
        registry.register(registration(&factory, "a", HookEvent::ReportAfter, 1)).await;
        registry.register(registration(&factory, "ab", HookEvent::ReportAfter, 2)).await;
        registry.register(registration(&factory, "a", HookEvent::AutofixBefore, 3)).await;

        assert_eq!(registry.plugin_handler_count("a").await, 2);
        assert_eq!(registry.unregister_plugin("a").await, 2);

        let left = registry.get_handlers(HookEvent::ReportAfter).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].plugin_id, "ab");
        assert!(!registry.has_handlers(HookEvent::AutofixBefore).await);
        assert_eq!(registry.registered_hooks().await, vec![HookEvent::ReportAfter]);
    }
}
