//! No-eval plugin implementation.

use std::sync::Arc;

use async_trait::async_trait;

use umr_core::result::AppResult;
use umr_plugin::api::context::PluginContext;
use umr_plugin::hooks::definitions::HookEvent;
use umr_plugin::manifest::PluginMetadata;
use umr_plugin::plugin::{Plugin, PluginCapabilities};
use umr_plugin_sdk::plugin_metadata;

use crate::hooks::{AppendSummary, ScanBeforeValidation};
use crate::rule::NoEvalRule;

/// Plugin id, as declared in `plugin.json`.
pub const PLUGIN_ID: &str = "no-eval";

/// Scans before validation at high priority so later handlers see the
/// annotation.
const SCAN_PRIORITY: i32 = 100;

/// Contributes the `no-eval` rule and its hooks.
#[derive(Debug, Default)]
pub struct NoEvalPlugin;

impl NoEvalPlugin {
    /// Creates the plugin.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for NoEvalPlugin {
    fn metadata(&self) -> PluginMetadata {
        plugin_metadata!(
            id: PLUGIN_ID,
            name: "No Eval",
            version: env!("CARGO_PKG_VERSION"),
            description: "Flags eval() and friends in validated documents",
        )
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::new()
            .with_rule(Arc::new(NoEvalRule::default()))
            .with_hook(HookEvent::ValidationBefore, SCAN_PRIORITY, Arc::new(ScanBeforeValidation))
            .with_hook(HookEvent::ReportAfter, 0, Arc::new(AppendSummary))
    }

    async fn on_activate(&self, ctx: &PluginContext) -> AppResult<()> {
        tracing::info!(plugin_id = PLUGIN_ID, config = %ctx.config, "No-eval plugin activated");
        Ok(())
    }

    async fn on_deactivate(&self, ctx: &PluginContext) -> AppResult<()> {
        ctx.logger.info("Deactivated");
        Ok(())
    }
}
