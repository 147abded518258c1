//! Shared test helpers for plugin runtime integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use umr_core::config::PluginManagerConfig;
use umr_core::error::AppError;
use umr_core::result::AppResult;
use umr_plugin::api::context::PluginContext;
use umr_plugin::manifest::{MANIFEST_FILE, PluginMetadata};
use umr_plugin::plugin::{Plugin, PluginCapabilities};
use umr_plugin::traits::ClosureHandler;
use umr_plugin::{HookHandler, HookOutcome, PluginManager};

/// A plugin whose behavior is configured by the test.
#[derive(Debug, Clone)]
pub struct TestPlugin {
    pub id: String,
    pub capabilities: PluginCapabilities,
    /// Callback that returns an error.
    pub fail_stage: Option<&'static str>,
    /// Callback that sleeps before returning.
    pub hang_stage: Option<(&'static str, Duration)>,
    /// Callbacks invoked, in order.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl TestPlugin {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            capabilities: PluginCapabilities::new(),
            fail_stage: None,
            hang_stage: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: PluginCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn failing_in(mut self, stage: &'static str) -> Self {
        self.fail_stage = Some(stage);
        self
    }

    pub fn hanging_in(mut self, stage: &'static str, delay: Duration) -> Self {
        self.hang_stage = Some((stage, delay));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, stage: &'static str) -> AppResult<()> {
        self.calls.lock().unwrap().push(stage.to_string());
        if let Some((hang, delay)) = self.hang_stage {
            if hang == stage {
                tokio::time::sleep(delay).await;
            }
        }
        if self.fail_stage == Some(stage) {
            return Err(AppError::plugin(format!("{stage} exploded")));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(&self.id, &self.id, "1.0.0")
    }

    fn capabilities(&self) -> PluginCapabilities {
        self.capabilities.clone()
    }

    async fn on_load(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.record("load").await
    }

    async fn on_activate(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.record("activate").await
    }

    async fn on_deactivate(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.record("deactivate").await
    }

    async fn on_unload(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.record("unload").await
    }
}

/// Handler that appends `tag` to the payload's `trace` array.
pub fn tagger(tag: &'static str) -> Arc<dyn HookHandler> {
    ClosureHandler::wrap(tag, move |mut data: Value, _ctx| async move {
        if let Some(trace) = data.get_mut("trace").and_then(Value::as_array_mut) {
            trace.push(json!(tag));
        }
        Ok(HookOutcome::replace(data))
    })
}

/// Writes a minimal valid plugin directory and returns its path.
pub fn write_plugin_dir(root: &Path, dir_name: &str, id: &str) -> PathBuf {
    let dir = root.join(dir_name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&json!({
            "metadata": {"id": id, "name": id, "version": "1.0.0"},
            "main": "index.js",
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(dir.join("index.js"), "module.exports = {};").unwrap();
    dir
}

/// A manager over a temporary plugin root.
pub struct TestHost {
    pub root: TempDir,
    pub manager: PluginManager,
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut PluginManagerConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = PluginManagerConfig {
            plugin_dirs: vec![root.path().to_path_buf()],
            load_timeout_ms: 1_000,
            hook_timeout_ms: 1_000,
            ..Default::default()
        };
        configure(&mut config);

        Self {
            root,
            manager: PluginManager::new(config),
        }
    }

    /// Writes the plugin's directory and registers its factory.
    pub fn install(&self, plugin: &TestPlugin) -> PathBuf {
        let dir = write_plugin_dir(self.root.path(), &plugin.id, &plugin.id);
        let template = plugin.clone();
        self.manager
            .register_factory(&plugin.id, move || -> Arc<dyn Plugin> { Arc::new(template.clone()) });
        dir
    }

    /// Installs, loads and activates a plugin.
    pub async fn activate(&self, plugin: &TestPlugin) -> String {
        let dir = self.install(plugin);
        let id = self.manager.load_plugin(&dir).await.unwrap();
        self.manager.activate_plugin(&id).await.unwrap();
        id
    }

    /// The context of a loaded plugin.
    pub async fn context(&self, plugin_id: &str) -> PluginContext {
        self.manager
            .registry()
            .get(plugin_id)
            .await
            .expect("plugin is loaded")
            .context
    }
}
