//! # umr-plugin
//!
//! Plugin runtime for UMR. Provides:
//!
//! - Manifest loading (`plugin.json`, or `umrPlugin` in `package.json`)
//! - Structure validation and directory discovery
//! - Plugin lifecycle management (load, activate, deactivate, unload)
//! - Hook registry and dispatcher with priority ordering and short-circuit
//! - Per-plugin contexts: namespaced logger, events, storage and host API
//! - Optional dynamic loading via `libloading` (`dynamic` feature)

pub mod api;
pub mod capabilities;
pub mod discovery;
pub mod events;
pub mod ffi;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod rules;
pub mod traits;
pub mod validator;

pub use api::context::PluginContext;
pub use discovery::{DiscoveryResult, PluginDiscovery};
pub use events::PluginEvent;
pub use hooks::definitions::{HookEvent, HookOutcome};
pub use hooks::dispatcher::{DispatchResult, HookDispatcher};
pub use hooks::registry::{HookHandler, HookRegistry};
pub use manager::{InitSummary, InstallOptions, PluginManager};
pub use manifest::{PluginManifest, PluginMetadata};
pub use plugin::{Plugin, PluginCapabilities};
pub use registry::{PluginRegistry, PluginSnapshot, PluginStatus};
pub use rules::RuleTable;
pub use validator::{StructureValidator, ValidationReport};
