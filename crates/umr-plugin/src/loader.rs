//! Plugin loader: turns a validated manifest into a plugin instance.
//!
//! Plugins compiled into the host register a factory under their id.
//! With the `dynamic` feature, an entry point that is a shared library
//! (.so / .dll / .dylib) is opened with `libloading` instead.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use umr_core::error::AppError;
use umr_core::result::AppResult;

use crate::manifest::PluginManifest;
use crate::plugin::Plugin;

/// Constructor for a statically linked plugin.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Resolves plugin ids to instances.
pub struct PluginLoader {
    /// Plugin id → factory.
    factories: DashMap<String, PluginFactory>,
    /// Loaded libraries (kept alive for the lifetime of the loader).
    #[cfg(feature = "dynamic")]
    libraries: std::sync::Mutex<Vec<libloading::Library>>,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut factories: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        factories.sort();
        f.debug_struct("PluginLoader")
            .field("factories", &factories)
            .finish()
    }
}

impl PluginLoader {
    /// Creates a loader with no factories.
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            #[cfg(feature = "dynamic")]
            libraries: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Registers the factory for `plugin_id`, replacing any previous one.
    pub fn register_factory<F>(&self, plugin_id: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        debug!(plugin_id = %plugin_id, "Registered plugin factory");
        self.factories.insert(plugin_id.to_string(), Arc::new(factory));
    }

    /// Whether a factory is registered for `plugin_id`.
    pub fn has_factory(&self, plugin_id: &str) -> bool {
        self.factories.contains_key(plugin_id)
    }

    /// Instantiates the plugin described by `manifest` and checks that the
    /// instance matches it.
    pub fn instantiate(&self, manifest: &PluginManifest, entry: &Path) -> AppResult<Arc<dyn Plugin>> {
        let id = manifest.metadata.id.as_str();

        let factory = self.factories.get(id).map(|f| Arc::clone(f.value()));
        let plugin = match factory {
            Some(factory) => factory(),
            None => self.load_library(id, entry)?,
        };

        verify_structure(manifest, plugin.as_ref())?;
        Ok(plugin)
    }

    #[cfg(feature = "dynamic")]
    fn load_library(&self, plugin_id: &str, entry: &Path) -> AppResult<Arc<dyn Plugin>> {
        use crate::ffi::abi::{
            ABI_VERSION, ABI_VERSION_SYMBOL, AbiVersionFn, CREATE_SYMBOL, CreatePluginFn,
            PluginHandle,
        };

        if !is_shared_library(entry) {
            return Err(no_loader(plugin_id, entry));
        }

        // SAFETY: opening a library runs its initializers. Only directories
        // the host operator configured are ever scanned.
        let library = unsafe { libloading::Library::new(entry) }.map_err(|e| {
            AppError::plugin(format!(
                "Failed to load plugin library '{}': {e}",
                entry.display()
            ))
        })?;

        let plugin = {
            // SAFETY: the symbol type matches the exported signature.
            let version = unsafe { library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL) }
                .map_err(|e| AppError::plugin(format!("Plugin '{plugin_id}' has no ABI version symbol: {e}")))?;
            // SAFETY: the function takes no arguments and has no preconditions.
            let version = unsafe { version() };
            if version != ABI_VERSION {
                return Err(AppError::plugin(format!(
                    "Plugin '{plugin_id}' targets ABI {version}, host supports {ABI_VERSION}"
                )));
            }

            // SAFETY: the symbol type matches the exported signature.
            let create = unsafe { library.get::<CreatePluginFn>(CREATE_SYMBOL) }
                .map_err(|e| AppError::plugin(format!("Plugin '{plugin_id}' has no constructor symbol: {e}")))?;
            // SAFETY: the constructor returns a pointer from `Box::into_raw`.
            let raw = unsafe { create() };
            if raw.is_null() {
                return Err(AppError::plugin(format!(
                    "Plugin '{plugin_id}' constructor returned null"
                )));
            }
            // SAFETY: non-null and ownership is transferred to the host.
            let PluginHandle(plugin) = *unsafe { Box::from_raw(raw) };
            plugin
        };

        tracing::info!(plugin_id = %plugin_id, path = %entry.display(), "Dynamic plugin loaded");

        self.libraries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(library);

        Ok(plugin)
    }

    #[cfg(not(feature = "dynamic"))]
    fn load_library(&self, plugin_id: &str, entry: &Path) -> AppResult<Arc<dyn Plugin>> {
        Err(no_loader(plugin_id, entry))
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that an instance is the plugin its manifest describes.
pub fn verify_structure(manifest: &PluginManifest, plugin: &dyn Plugin) -> AppResult<()> {
    let metadata = plugin.metadata();

    if metadata.id != manifest.metadata.id {
        return Err(AppError::plugin(format!(
            "Invalid plugin structure: instance id '{}' does not match manifest id '{}'",
            metadata.id, manifest.metadata.id
        )));
    }
    if metadata.version.trim().is_empty() {
        return Err(AppError::plugin(format!(
            "Invalid plugin structure: '{}' reports no version",
            metadata.id
        )));
    }
    Ok(())
}

fn no_loader(plugin_id: &str, entry: &Path) -> AppError {
    AppError::plugin(format!(
        "No factory registered for plugin '{plugin_id}' and '{}' is not a loadable library",
        entry.display()
    ))
}

#[cfg(feature = "dynamic")]
fn is_shared_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so" | "dylib" | "dll")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginMetadata;
    use umr_core::error::ErrorKind;

    #[derive(Debug)]
    struct Stub(PluginMetadata);

    #[async_trait::async_trait]
    impl Plugin for Stub {
        fn metadata(&self) -> PluginMetadata {
            self.0.clone()
        }
    }

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest {
            metadata: PluginMetadata::new(id, id, "1.0.0"),
            main: "index.js".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_factory_instantiation() {
        let loader = PluginLoader::new();
        loader.register_factory("a", || Arc::new(Stub(PluginMetadata::new("a", "A", "1.0.0"))));

        let plugin = loader.instantiate(&manifest("a"), Path::new("index.js")).unwrap();
        assert_eq!(plugin.metadata().id, "a");
    }

    #[test]
    fn test_missing_factory() {
        let loader = PluginLoader::new();
        let err = loader
            .instantiate(&manifest("a"), Path::new("index.js"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Plugin);
    }

    #[test]
    fn test_structure_mismatch() {
        let loader = PluginLoader::new();
        loader.register_factory("a", || Arc::new(Stub(PluginMetadata::new("b", "B", "1.0.0"))));
        loader.register_factory("c", || Arc::new(Stub(PluginMetadata::new("c", "C", ""))));

        let err = loader.instantiate(&manifest("a"), Path::new("x")).unwrap_err();
        assert!(err.message.contains("Invalid plugin structure"));
        let err = loader.instantiate(&manifest("c"), Path::new("x")).unwrap_err();
        assert!(err.message.contains("Invalid plugin structure"));
    }
}
