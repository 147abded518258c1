//! Capability registrar: wires a plugin's rules and hooks into the host.

use std::sync::Arc;

use tracing::{debug, warn};

use umr_core::result::AppResult;

use crate::api::context::PluginContext;
use crate::hooks::registry::{HookRegistration, HookRegistry};
use crate::plugin::PluginCapabilities;
use crate::rules::RuleTable;

/// Registers and retracts capabilities by plugin id.
#[derive(Debug, Clone)]
pub struct CapabilityRegistrar {
    rules: Arc<RuleTable>,
    hooks: Arc<HookRegistry>,
}

impl CapabilityRegistrar {
    /// Creates a registrar over the shared rule table and hook registry.
    pub fn new(rules: Arc<RuleTable>, hooks: Arc<HookRegistry>) -> Self {
        Self { rules, hooks }
    }

    /// Registers every capability of the plugin owning `ctx`.
    ///
    /// Either everything is registered or, on the first failure, nothing
    /// the plugin owns remains registered.
    pub async fn register(&self, ctx: &PluginContext, capabilities: &PluginCapabilities) -> AppResult<()> {
        let plugin_id = ctx.plugin_id();

        for rule in &capabilities.validation_rules {
            if let Err(e) = self.rules.register(plugin_id, Arc::clone(rule)).await {
                warn!(plugin_id = %plugin_id, rule_id = %rule.id(), error = %e, "Rule registration failed");
                self.unregister(plugin_id).await;
                return Err(e);
            }
        }

        for hook in &capabilities.hooks {
            self.hooks
                .register(HookRegistration {
                    plugin_id: plugin_id.to_string(),
                    event: hook.event,
                    handler: Arc::clone(&hook.handler),
                    priority: hook.priority,
                    context: ctx.clone(),
                })
                .await;
        }

        debug!(
            plugin_id = %plugin_id,
            rules = capabilities.validation_rules.len(),
            hooks = capabilities.hooks.len(),
            "Registered plugin capabilities"
        );
        Ok(())
    }

    /// Removes every rule and hook owned by `plugin_id`.
    pub async fn unregister(&self, plugin_id: &str) {
        let rules = self.rules.unregister_owner(plugin_id).await;
        let hooks = self.hooks.unregister_plugin(plugin_id).await;
        debug!(plugin_id = %plugin_id, rules, hooks, "Retracted plugin capabilities");
    }
}
