//! Plugin runtime configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plugin manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManagerConfig {
    /// Root directories scanned for plugin subdirectories.
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<PathBuf>,
    /// Whether to load every valid discovered plugin on initialization.
    #[serde(default = "default_true")]
    pub auto_load: bool,
    /// Whether to activate every plugin loaded on initialization.
    #[serde(default)]
    pub auto_activate: bool,
    /// Budget for a single lifecycle callback, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Budget for a single hook handler invocation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub hook_timeout_ms: u64,
    /// Maximum number of root directories scanned concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Allow plugins that request unrestricted permissions.
    #[serde(default)]
    pub allow_unsafe: bool,
    /// Per-plugin configuration objects keyed by plugin id.
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    /// Security policy.
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Plugin security policy.
///
/// Only structural checks are enforced; the resource limits are carried
/// for hosts that run plugins out of process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Source prefixes accepted by `install_plugin` (empty = any).
    #[serde(default)]
    pub allowed_sources: Vec<String>,
    /// Require a `plugin.sig` file next to the manifest.
    #[serde(default)]
    pub require_signing: bool,
    /// Restrict the plugin filesystem facade to allowed roots.
    #[serde(default = "default_true")]
    pub sandboxed: bool,
    /// Extra directories the filesystem facade may touch, besides the
    /// plugin's own directory.
    #[serde(default)]
    pub fs_roots: Vec<PathBuf>,
    /// Declared resource limits.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
}

/// Declared per-plugin resource limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in megabytes (0 = unlimited, advisory).
    #[serde(default)]
    pub max_memory_mb: u64,
    /// CPU ceiling in percent (0 = unlimited, advisory).
    #[serde(default)]
    pub max_cpu_percent: u32,
    /// Maximum filesystem operations per plugin context (0 = unlimited).
    #[serde(default)]
    pub max_file_access: u64,
}

impl PluginManagerConfig {
    /// Lifecycle callback timeout.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Hook handler timeout.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    /// Returns the configured settings object for a plugin, if any.
    pub fn settings_for(&self, plugin_id: &str) -> Option<&serde_json::Value> {
        self.settings.get(plugin_id)
    }
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: default_plugin_dirs(),
            auto_load: true,
            auto_activate: false,
            load_timeout_ms: default_timeout_ms(),
            hook_timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            allow_unsafe: false,
            settings: HashMap::new(),
            security: SecurityConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_sources: Vec::new(),
            require_signing: false,
            sandboxed: true,
            fs_roots: Vec::new(),
            resource_limits: ResourceLimits::default(),
        }
    }
}

fn default_plugin_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("./plugins")]
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}
