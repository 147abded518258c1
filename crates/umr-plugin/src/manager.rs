//! Plugin manager: lifecycle management for all plugins.
//!
//! ```text
//! load ──► loaded ──activate──► activating ──► active
//!            ▲                      │            │
//!            │                      ▼         deactivate
//!            └──────────────── deactivating ◄────┘
//!                                   │
//!                    (callback failure) ──► error
//! ```
//!
//! Operations on the same plugin id are serialized; operations on
//! different ids run concurrently.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tracing::{error, info, warn};

use umr_core::config::PluginManagerConfig;
use umr_core::error::{AppError, ErrorKind};
use umr_core::result::AppResult;

use crate::api::context::ContextFactory;
use crate::api::services::HostServices;
use crate::capabilities::CapabilityRegistrar;
use crate::discovery::{DiscoveryResult, PluginDiscovery};
use crate::events::{PluginEvent, PluginEventBus};
use crate::hooks::definitions::HookEvent;
use crate::hooks::dispatcher::{DispatchResult, HookDispatcher};
use crate::hooks::registry::HookRegistry;
use crate::loader::PluginLoader;
use crate::manifest;
use crate::plugin::Plugin;
use crate::registry::{PluginRegistry, PluginRegistryEntry, PluginSnapshot, PluginStatus};
use crate::rules::RuleTable;
use crate::validator::{StructureValidator, entry_point};

/// Options for [`PluginManager::install_plugin`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Where to fetch the plugin from.
    pub source: String,
    /// Replace an existing installation.
    #[serde(default)]
    pub force: bool,
}

/// A plugin that could not be brought up during initialization.
#[derive(Debug, Clone, Serialize)]
pub struct InitFailure {
    /// Plugin directory.
    pub path: PathBuf,
    /// What went wrong.
    pub error: String,
}

/// Outcome of [`PluginManager::initialize`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitSummary {
    /// Number of plugin directories discovered.
    pub discovered: usize,
    /// Ids loaded.
    pub loaded: Vec<String>,
    /// Ids activated.
    pub activated: Vec<String>,
    /// Discovery, load and activation failures.
    pub failures: Vec<InitFailure>,
}

/// Manages the full lifecycle of plugins: discover, load, activate,
/// deactivate, unload.
#[derive(Debug)]
pub struct PluginManager {
    /// Runtime configuration.
    config: Arc<PluginManagerConfig>,
    /// Plugin registry.
    registry: Arc<PluginRegistry>,
    /// Hook registry.
    hook_registry: Arc<HookRegistry>,
    /// Hook dispatcher.
    dispatcher: Arc<HookDispatcher>,
    /// Host rule table.
    rules: Arc<RuleTable>,
    /// Capability registrar.
    registrar: CapabilityRegistrar,
    /// Context factory.
    contexts: ContextFactory,
    /// Plugin loader.
    loader: PluginLoader,
    /// Discovery engine.
    discovery: PluginDiscovery,
    /// Structure validator.
    validator: StructureValidator,
    /// Lifecycle event bus.
    events: PluginEventBus,
    /// Per-id operation locks.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PluginManager {
    /// Creates a manager with the default host services.
    pub fn new(config: PluginManagerConfig) -> Self {
        Self::with_host_services(config, HostServices::default())
    }

    /// Creates a manager whose plugins reach the given host services.
    pub fn with_host_services(config: PluginManagerConfig, host: HostServices) -> Self {
        let config = Arc::new(config);
        let hook_registry = Arc::new(HookRegistry::new());
        let dispatcher = Arc::new(HookDispatcher::new(
            Arc::clone(&hook_registry),
            config.hook_timeout(),
        ));
        let rules = Arc::new(RuleTable::new());

        Self {
            registry: Arc::new(PluginRegistry::new()),
            registrar: CapabilityRegistrar::new(Arc::clone(&rules), Arc::clone(&hook_registry)),
            contexts: ContextFactory::new(Arc::clone(&config), Arc::clone(&rules), host),
            loader: PluginLoader::new(),
            discovery: PluginDiscovery::new(&config),
            validator: StructureValidator::new(&config),
            events: PluginEventBus::new(),
            locks: DashMap::new(),
            hook_registry,
            dispatcher,
            rules,
            config,
        }
    }

    /// Registers the constructor for a statically linked plugin.
    pub fn register_factory<F>(&self, plugin_id: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.loader.register_factory(plugin_id, factory);
    }

    /// Scans the configured roots without loading anything.
    pub async fn discover_plugins(&self) -> DiscoveryResult {
        self.discovery.discover().await
    }

    /// Loads the plugin in `path` and returns its id.
    ///
    /// An already loaded plugin with the same id is replaced: its
    /// capabilities are retracted and its namespace is cleared, but its
    /// deactivate and unload callbacks are not run.
    pub async fn load_plugin(&self, path: impl AsRef<Path>) -> AppResult<String> {
        let dir = path.as_ref();

        let loaded = manifest::load_manifest(dir).await?.ok_or_else(|| {
            AppError::validation(format!("No plugin manifest found in '{}'", dir.display()))
        })?;
        self.validator
            .validate(dir, &loaded.manifest)
            .await
            .into_result(dir)?;

        let manifest = loaded.manifest;
        let plugin_id = manifest.metadata.id.clone();
        let _guard = self.lock(&plugin_id).await;

        let plugin = self
            .loader
            .instantiate(&manifest, &entry_point(dir, &manifest))?;

        if let Some(previous) = self.registry.remove(&plugin_id).await {
            warn!(
                plugin_id = %plugin_id,
                previous_status = %previous.status,
                "Plugin already loaded, replacing previous entry"
            );
            previous.context.api.set_registration_open(false);
            self.registrar.unregister(&plugin_id).await;
            self.contexts.release(&plugin_id);
        }

        let context = self.contexts.create(&manifest, dir);

        if let Err(e) = self
            .run_callback(&plugin_id, "on_load", plugin.on_load(&context))
            .await
        {
            error!(plugin_id = %plugin_id, error = %e, "Plugin load failed");
            self.registrar.unregister(&plugin_id).await;
            self.contexts.release(&plugin_id);
            self.events.publish(PluginEvent::Error {
                plugin_id: plugin_id.clone(),
                error: e.to_string(),
            });
            return Err(e);
        }

        self.registry
            .insert(PluginRegistryEntry {
                plugin,
                status: PluginStatus::Loaded,
                context,
                path: dir.to_path_buf(),
                manifest,
                loaded_at: Utc::now(),
                activated_at: None,
                error: None,
            })
            .await;

        info!(plugin_id = %plugin_id, path = %dir.display(), "Plugin loaded");
        self.events.publish(PluginEvent::Loaded {
            plugin_id: plugin_id.clone(),
        });

        Ok(plugin_id)
    }

    /// Registers the plugin's capabilities and runs its activate callback.
    ///
    /// Requires status `loaded`. On failure nothing the plugin contributed
    /// stays registered and the plugin is left in `error`.
    pub async fn activate_plugin(&self, plugin_id: &str) -> AppResult<()> {
        let _guard = self.lock(plugin_id).await;

        let entry = self
            .registry
            .transition(plugin_id, &[PluginStatus::Loaded], PluginStatus::Activating)
            .await?;
        entry.context.api.set_registration_open(true);

        let activation = async {
            let capabilities = entry.plugin.capabilities();
            self.registrar.register(&entry.context, &capabilities).await?;
            self.run_callback(plugin_id, "on_activate", entry.plugin.on_activate(&entry.context))
                .await
        }
        .await;

        if let Err(e) = activation {
            entry.context.api.set_registration_open(false);
            self.registrar.unregister(plugin_id).await;
            return self.fail(plugin_id, e).await;
        }

        self.registry
            .transition(plugin_id, &[PluginStatus::Activating], PluginStatus::Active)
            .await?;

        info!(plugin_id = %plugin_id, "Plugin activated");
        self.events.publish(PluginEvent::Activated {
            plugin_id: plugin_id.to_string(),
        });
        Ok(())
    }

    /// Retracts the plugin's capabilities and runs its deactivate callback.
    ///
    /// Requires status `active`.
    pub async fn deactivate_plugin(&self, plugin_id: &str) -> AppResult<()> {
        let _guard = self.lock(plugin_id).await;
        self.deactivate_locked(plugin_id).await
    }

    async fn deactivate_locked(&self, plugin_id: &str) -> AppResult<()> {
        let entry = self
            .registry
            .transition(plugin_id, &[PluginStatus::Active], PluginStatus::Deactivating)
            .await?;

        entry.context.api.set_registration_open(false);
        self.registrar.unregister(plugin_id).await;

        if let Err(e) = self
            .run_callback(plugin_id, "on_deactivate", entry.plugin.on_deactivate(&entry.context))
            .await
        {
            return self.fail(plugin_id, e).await;
        }

        self.registry
            .transition(plugin_id, &[PluginStatus::Deactivating], PluginStatus::Loaded)
            .await?;

        info!(plugin_id = %plugin_id, "Plugin deactivated");
        self.events.publish(PluginEvent::Deactivated {
            plugin_id: plugin_id.to_string(),
        });
        Ok(())
    }

    /// Removes a plugin, deactivating it first if it is active.
    ///
    /// Accepts `loaded`, `active` and `error`. For a plugin already in
    /// `error`, a failing unload callback is logged and removal proceeds.
    pub async fn unload_plugin(&self, plugin_id: &str) -> AppResult<()> {
        let _guard = self.lock(plugin_id).await;

        let mut entry = self
            .registry
            .require_status(
                plugin_id,
                &[PluginStatus::Loaded, PluginStatus::Active, PluginStatus::Error],
            )
            .await?;

        if entry.status == PluginStatus::Active {
            self.deactivate_locked(plugin_id).await?;
            entry.status = PluginStatus::Loaded;
        }

        if let Err(e) = self
            .run_callback(plugin_id, "on_unload", entry.plugin.on_unload(&entry.context))
            .await
        {
            if entry.status != PluginStatus::Error {
                return self.fail(plugin_id, e).await;
            }
            warn!(plugin_id = %plugin_id, error = %e, "Unload callback failed, removing plugin anyway");
        }

        self.registrar.unregister(plugin_id).await;
        self.registry.remove(plugin_id).await;
        self.contexts.release(plugin_id);

        info!(plugin_id = %plugin_id, "Plugin unloaded");
        self.events.publish(PluginEvent::Unloaded {
            plugin_id: plugin_id.to_string(),
        });
        Ok(())
    }

    /// Discovers and, per configuration, loads and activates plugins.
    ///
    /// Individual failures are collected in the summary, never returned.
    pub async fn initialize(&self) -> InitSummary {
        let discovered = self.discover_plugins().await;
        let mut summary = InitSummary {
            discovered: discovered.plugins.len(),
            ..Default::default()
        };

        summary
            .failures
            .extend(discovered.errors.into_iter().map(|e| InitFailure {
                path: e.path,
                error: e.message,
            }));

        if !self.config.auto_load {
            info!(discovered = summary.discovered, "Plugin auto-load disabled");
            return summary;
        }

        for plugin in discovered.plugins {
            if !plugin.valid {
                summary.failures.push(InitFailure {
                    path: plugin.path,
                    error: plugin.errors.join("; "),
                });
                continue;
            }

            match self.load_plugin(&plugin.path).await {
                Ok(id) => summary.loaded.push(id),
                Err(e) => summary.failures.push(InitFailure {
                    path: plugin.path,
                    error: e.to_string(),
                }),
            }
        }

        if self.config.auto_activate {
            for id in summary.loaded.clone() {
                match self.activate_plugin(&id).await {
                    Ok(()) => summary.activated.push(id),
                    Err(e) => {
                        let path = self
                            .registry
                            .get(&id)
                            .await
                            .map(|entry| entry.path)
                            .unwrap_or_default();
                        summary.failures.push(InitFailure {
                            path,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            discovered = summary.discovered,
            loaded = summary.loaded.len(),
            activated = summary.activated.len(),
            failures = summary.failures.len(),
            "Plugin manager initialized"
        );
        summary
    }

    /// Unloads every plugin, logging failures.
    pub async fn unload_all(&self) {
        for plugin_id in self.registry.ids().await {
            if let Err(e) = self.unload_plugin(&plugin_id).await {
                error!(plugin_id = %plugin_id, error = %e, "Error unloading plugin");
            }
        }
        info!("All plugins unloaded");
    }

    /// Installs a plugin from a remote source.
    ///
    /// Only the source policy is checked; fetching is not supported.
    pub async fn install_plugin(&self, options: InstallOptions) -> AppResult<String> {
        let source = options.source.trim();
        if source.is_empty() {
            return Err(AppError::validation("Install source must not be empty"));
        }

        let allowed = &self.config.security.allowed_sources;
        if !allowed.is_empty() && !allowed.iter().any(|prefix| source.starts_with(prefix.as_str())) {
            return Err(AppError::permission(format!(
                "Install source '{source}' is not in the allowed sources"
            )));
        }

        Err(AppError::not_implemented(format!(
            "Installing plugins from '{source}' is not supported"
        )))
    }

    /// Runs every hook handler for `event` and returns the final payload.
    pub async fn execute_hooks(&self, event: HookEvent, data: Value) -> Value {
        self.dispatcher.execute_hooks(event, data).await
    }

    /// Typed wrapper around [`execute_hooks`](Self::execute_hooks).
    pub async fn execute_hooks_typed<T>(&self, event: HookEvent, data: T) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.dispatcher.execute_hooks_typed(event, data).await
    }

    /// Runs every hook handler for `event` and reports what happened.
    pub async fn dispatch(&self, event: HookEvent, data: Value) -> DispatchResult {
        self.dispatcher.dispatch(event, data).await
    }

    /// Snapshots of every loaded plugin, ordered by id.
    pub async fn get_plugins(&self) -> Vec<PluginSnapshot> {
        self.registry.list().await.iter().map(PluginRegistryEntry::snapshot).collect()
    }

    /// Snapshot of one plugin.
    pub async fn get_plugin(&self, plugin_id: &str) -> Option<PluginSnapshot> {
        self.registry.get(plugin_id).await.map(|e| e.snapshot())
    }

    /// Snapshots of every active plugin, ordered by id.
    pub async fn get_active_plugins(&self) -> Vec<PluginSnapshot> {
        self.registry.active().await.iter().map(PluginRegistryEntry::snapshot).collect()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Arc<PluginManagerConfig> {
        &self.config
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the hook registry.
    pub fn hook_registry(&self) -> &Arc<HookRegistry> {
        &self.hook_registry
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Returns the host rule table.
    pub fn rules(&self) -> &Arc<RuleTable> {
        &self.rules
    }

    /// Returns the context factory.
    pub fn contexts(&self) -> &ContextFactory {
        &self.contexts
    }

    async fn lock(&self, plugin_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(plugin_id.to_string()).or_default().value());
        lock.lock_owned().await
    }

    /// Runs a lifecycle callback under the load timeout, isolating panics.
    async fn run_callback<F>(&self, plugin_id: &str, stage: &str, call: F) -> AppResult<()>
    where
        F: Future<Output = AppResult<()>>,
    {
        let timeout = self.config.load_timeout();

        match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(AppError::with_source(
                ErrorKind::Plugin,
                format!("Plugin '{plugin_id}' {stage} failed: {}", e.message),
                e,
            )),
            Ok(Err(_)) => Err(AppError::plugin(format!(
                "Plugin '{plugin_id}' panicked in {stage}"
            ))),
            Err(_) => Err(AppError::timeout(format!(
                "Plugin '{plugin_id}' {stage} timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Moves a plugin to `error`, publishes the failure and returns it.
    async fn fail<T>(&self, plugin_id: &str, e: AppError) -> AppResult<T> {
        error!(plugin_id = %plugin_id, error = %e, "Plugin lifecycle callback failed");
        self.registry.mark_error(plugin_id, &e).await;
        self.events.publish(PluginEvent::Error {
            plugin_id: plugin_id.to_string(),
            error: e.to_string(),
        });
        Err(e)
    }
}
