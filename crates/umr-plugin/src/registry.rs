//! Plugin registry: one entry per loaded plugin id.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use umr_core::error::AppError;
use umr_core::result::AppResult;

use crate::api::context::PluginContext;
use crate::manifest::{PluginManifest, PluginMetadata};
use crate::plugin::Plugin;

/// Lifecycle status of a registered plugin.
///
/// A plugin absent from the registry is unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Instantiated, capabilities not registered.
    Loaded,
    /// Registering capabilities.
    Activating,
    /// Capabilities registered.
    Active,
    /// Retracting capabilities.
    Deactivating,
    /// A lifecycle callback failed.
    Error,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A registered plugin.
#[derive(Debug, Clone)]
pub struct PluginRegistryEntry {
    /// The plugin instance.
    pub plugin: Arc<dyn Plugin>,
    /// Current status.
    pub status: PluginStatus,
    /// Context created for this load.
    pub context: PluginContext,
    /// Plugin directory.
    pub path: PathBuf,
    /// Manifest read at load time.
    pub manifest: PluginManifest,
    /// When the plugin was loaded.
    pub loaded_at: DateTime<Utc>,
    /// When the plugin last became active.
    pub activated_at: Option<DateTime<Utc>>,
    /// Last lifecycle error.
    pub error: Option<AppError>,
}

impl PluginRegistryEntry {
    /// The plugin id.
    pub fn id(&self) -> &str {
        &self.manifest.metadata.id
    }

    /// Serializable view of the entry.
    pub fn snapshot(&self) -> PluginSnapshot {
        PluginSnapshot {
            metadata: self.manifest.metadata.clone(),
            status: self.status,
            path: self.path.clone(),
            loaded_at: self.loaded_at,
            activated_at: self.activated_at,
            error: self.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSnapshot {
    /// Manifest metadata.
    pub metadata: PluginMetadata,
    /// Current status.
    pub status: PluginStatus,
    /// Plugin directory.
    pub path: PathBuf,
    /// When the plugin was loaded.
    pub loaded_at: DateTime<Utc>,
    /// When the plugin last became active.
    pub activated_at: Option<DateTime<Utc>>,
    /// Last lifecycle error message.
    pub error: Option<String>,
}

/// Registry of all loaded plugins.
///
/// Mutation is reserved to the lifecycle manager; callers outside the
/// crate only get clones and snapshots.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: RwLock<HashMap<String, PluginRegistryEntry>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the one it replaced.
    pub(crate) async fn insert(&self, entry: PluginRegistryEntry) -> Option<PluginRegistryEntry> {
        let id = entry.id().to_string();
        info!(
            plugin_id = %id,
            name = %entry.manifest.metadata.name,
            version = %entry.manifest.metadata.version,
            "Registering plugin"
        );
        self.entries.write().await.insert(id, entry)
    }

    /// Removes an entry.
    pub(crate) async fn remove(&self, plugin_id: &str) -> Option<PluginRegistryEntry> {
        let removed = self.entries.write().await.remove(plugin_id);
        if removed.is_some() {
            info!(plugin_id = %plugin_id, "Plugin unregistered");
        }
        removed
    }

    /// Atomically checks the current status and moves to `to`.
    ///
    /// Fails without touching the entry if the id is unknown or its status
    /// is not one of `from`.
    pub(crate) async fn transition(
        &self,
        plugin_id: &str,
        from: &[PluginStatus],
        to: PluginStatus,
    ) -> AppResult<PluginRegistryEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(plugin_id)
            .ok_or_else(|| not_loaded(plugin_id))?;

        check_status(plugin_id, entry.status, from)?;

        debug!(plugin_id = %plugin_id, from = %entry.status, to = %to, "Plugin status transition");
        entry.status = to;
        match to {
            PluginStatus::Active => {
                entry.activated_at = Some(Utc::now());
                entry.error = None;
            }
            PluginStatus::Loaded => entry.activated_at = None,
            _ => {}
        }
        Ok(entry.clone())
    }

    /// Moves an entry to the error state and stores the error.
    pub(crate) async fn mark_error(&self, plugin_id: &str, error: &AppError) {
        if let Some(entry) = self.entries.write().await.get_mut(plugin_id) {
            entry.status = PluginStatus::Error;
            entry.error = Some(error.clone());
        }
    }

    /// Returns the entry if its status is one of `expected`.
    pub async fn require_status(
        &self,
        plugin_id: &str,
        expected: &[PluginStatus],
    ) -> AppResult<PluginRegistryEntry> {
        let entries = self.entries.read().await;
        let entry = entries.get(plugin_id).ok_or_else(|| not_loaded(plugin_id))?;
        check_status(plugin_id, entry.status, expected)?;
        Ok(entry.clone())
    }

    /// Gets an entry by id.
    pub async fn get(&self, plugin_id: &str) -> Option<PluginRegistryEntry> {
        self.entries.read().await.get(plugin_id).cloned()
    }

    /// Current status of a plugin.
    pub async fn status(&self, plugin_id: &str) -> Option<PluginStatus> {
        self.entries.read().await.get(plugin_id).map(|e| e.status)
    }

    /// Whether a plugin id is registered.
    pub async fn contains(&self, plugin_id: &str) -> bool {
        self.entries.read().await.contains_key(plugin_id)
    }

    /// All entries, ordered by id.
    pub async fn list(&self) -> Vec<PluginRegistryEntry> {
        let entries = self.entries.read().await;
        let mut list: Vec<PluginRegistryEntry> = entries.values().cloned().collect();
        list.sort_by(|a, b| a.id().cmp(b.id()));
        list
    }

    /// Active entries, ordered by id.
    pub async fn active(&self) -> Vec<PluginRegistryEntry> {
        let mut list = self.list().await;
        list.retain(|e| e.status == PluginStatus::Active);
        list
    }

    /// Registered ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered plugins.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn not_loaded(plugin_id: &str) -> AppError {
    AppError::not_found(format!("Plugin '{plugin_id}' is not loaded"))
}

fn check_status(plugin_id: &str, current: PluginStatus, expected: &[PluginStatus]) -> AppResult<()> {
    if expected.contains(&current) {
        return Ok(());
    }
    let expected = expected
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ");
    Err(AppError::invalid_state(format!(
        "Plugin '{plugin_id}' is {current}, expected {expected}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_serde() {
        for status in [
            PluginStatus::Loaded,
            PluginStatus::Activating,
            PluginStatus::Active,
            PluginStatus::Deactivating,
            PluginStatus::Error,
        ] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.to_string())
            );
        }
    }

    #[test]
    fn test_state_mismatch_message() {
        let err = check_status("a", PluginStatus::Active, &[PluginStatus::Loaded, PluginStatus::Error])
            .unwrap_err();
        assert_eq!(err.kind, umr_core::error::ErrorKind::InvalidState);
        assert!(err.message.contains("is active, expected loaded or error"));
    }
}
