//! Plugin API: the isolated context handed to plugin code.

pub mod context;
pub mod events;
pub mod fs;
pub mod logger;
pub mod services;
pub mod storage;

pub use context::{ContextFactory, PluginContext};
pub use events::{EventEmitter, ListenerId, PluginEvents};
pub use fs::SandboxedFs;
pub use logger::PluginLogger;
pub use services::{HostServices, PluginApi};
pub use storage::{PluginStorage, SharedStore};
