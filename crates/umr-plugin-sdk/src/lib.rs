//! # umr-plugin-sdk
//!
//! SDK for developing UMR plugins.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use umr_plugin_sdk::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct MyPlugin;
//!
//! #[async_trait]
//! impl Plugin for MyPlugin {
//!     fn metadata(&self) -> PluginMetadata {
//!         plugin_metadata!(id: "my-plugin", name: "My Plugin", version: "1.0.0")
//!     }
//!
//!     fn capabilities(&self) -> PluginCapabilities {
//!         PluginCapabilities::new().with_hook(
//!             HookEvent::ReportAfter,
//!             10,
//!             ClosureHandler::wrap("stamp", |data, _ctx| async move {
//!                 Ok(HookOutcome::replace(data))
//!             }),
//!         )
//!     }
//!
//!     async fn on_activate(&self, ctx: &PluginContext) -> AppResult<()> {
//!         ctx.logger.info("ready");
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(MyPlugin::default());
//! ```

pub mod macros;

/// Prelude for convenient imports.
pub mod prelude {
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use umr_core::error::AppError;
    pub use umr_core::result::AppResult;
    pub use umr_core::traits::{RuleViolation, Severity, ValidationRule};
    pub use umr_plugin::api::context::PluginContext;
    pub use umr_plugin::hooks::definitions::{HookEvent, HookOutcome};
    pub use umr_plugin::hooks::registry::HookHandler;
    pub use umr_plugin::manifest::PluginMetadata;
    pub use umr_plugin::plugin::{Plugin, PluginCapabilities};
    pub use umr_plugin::traits::{ClosureHandler, FnRule};

    pub use crate::{export_plugin, plugin_metadata};
}

#[doc(hidden)]
pub mod __private {
    pub use umr_plugin::ffi::abi::{ABI_VERSION, PluginHandle};
}
