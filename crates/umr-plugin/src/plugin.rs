//! The trait every plugin implements, and what it contributes.

use std::sync::Arc;

use async_trait::async_trait;

use umr_core::result::AppResult;
use umr_core::traits::ValidationRule;

use crate::api::context::PluginContext;
use crate::hooks::definitions::HookEvent;
use crate::hooks::registry::HookHandler;
use crate::manifest::PluginMetadata;

/// Priority used when a hook does not specify one.
pub const DEFAULT_HOOK_PRIORITY: i32 = 0;

/// One hook a plugin attaches to.
#[derive(Debug, Clone)]
pub struct HookCapability {
    /// Event the handler runs for.
    pub event: HookEvent,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
    /// Higher runs first.
    pub priority: i32,
}

/// Everything a plugin registers on activation.
#[derive(Debug, Clone, Default)]
pub struct PluginCapabilities {
    /// Validation rules added to the host rule table.
    pub validation_rules: Vec<Arc<dyn ValidationRule>>,
    /// Hook handlers.
    pub hooks: Vec<HookCapability>,
}

impl PluginCapabilities {
    /// Creates an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validation rule.
    pub fn with_rule(mut self, rule: Arc<dyn ValidationRule>) -> Self {
        self.validation_rules.push(rule);
        self
    }

    /// Adds a hook handler.
    pub fn with_hook(mut self, event: HookEvent, priority: i32, handler: Arc<dyn HookHandler>) -> Self {
        self.hooks.push(HookCapability {
            event,
            handler,
            priority,
        });
        self
    }

    /// Whether nothing is contributed.
    pub fn is_empty(&self) -> bool {
        self.validation_rules.is_empty() && self.hooks.is_empty()
    }
}

/// A loaded plugin instance.
///
/// Every lifecycle callback is optional. A callback returning an error, or
/// overrunning the configured timeout, moves the plugin to the error state.
#[async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Identity of the instance; `id` must match the manifest.
    fn metadata(&self) -> PluginMetadata;

    /// Rules and hooks registered when the plugin is activated.
    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::default()
    }

    /// Called once after the plugin is instantiated.
    async fn on_load(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called after capabilities are registered.
    async fn on_activate(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called after capabilities are retracted.
    async fn on_deactivate(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called before the plugin is removed from the registry.
    async fn on_unload(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }
}
