//! No-eval validation plugin for UMR.
//!
//! Registers the `no-eval` rule, scans documents on `validation:before`,
//! and appends scan totals to reports on `report:after`. The crate root
//! holds the plugin manifest, so it can be discovered like any plugin
//! directory; built as a cdylib it also exports the dynamic constructor.

pub mod hooks;
pub mod plugin;
pub mod rule;

use std::sync::Arc;

use umr_plugin::{Plugin, PluginManager};

pub use plugin::{NoEvalPlugin, PLUGIN_ID};
pub use rule::NoEvalRule;

/// Registers the built-in factory with a manager.
pub fn register(manager: &PluginManager) {
    manager.register_factory(PLUGIN_ID, || -> Arc<dyn Plugin> { Arc::new(NoEvalPlugin::new()) });
}

umr_plugin_sdk::export_plugin!(NoEvalPlugin::new());
