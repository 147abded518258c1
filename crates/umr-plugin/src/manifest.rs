//! Plugin manifest schema and loader.
//!
//! A directory is a candidate plugin if it holds a `plugin.json`, or a
//! `package.json` with a nested `umrPlugin` object of the same shape.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use umr_core::result::AppResult;

/// Primary manifest file name.
pub const MANIFEST_FILE: &str = "plugin.json";
/// Fallback package descriptor file name.
pub const PACKAGE_FILE: &str = "package.json";
/// Field of the package descriptor holding the manifest.
pub const PACKAGE_FIELD: &str = "umrPlugin";

/// Descriptive plugin metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin identifier.
    #[serde(default)]
    pub id: String,
    /// Human-readable plugin name.
    #[serde(default)]
    pub name: String,
    /// Plugin version string.
    #[serde(default)]
    pub version: String,
    /// Plugin description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Author or maintainer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Project homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// License identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Search keywords.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl PluginMetadata {
    /// Creates metadata with the three identifying fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }
}

/// Capabilities a plugin declares in its manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCapabilities {
    /// Validation rule ids the plugin contributes.
    #[serde(default)]
    pub validation_rules: Vec<String>,
    /// Hook event names the plugin attaches to.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Report formats the plugin contributes.
    #[serde(default)]
    pub reporters: Vec<String>,
    /// CLI commands the plugin contributes.
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Declarative description of a plugin, read before any plugin code runs.
///
/// Every field deserializes with a default so that incomplete manifests
/// still parse and the structure validator can name what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Plugin metadata.
    #[serde(default)]
    pub metadata: PluginMetadata,
    /// Entry point, relative to the plugin directory.
    #[serde(default)]
    pub main: String,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: ManifestCapabilities,
    /// JSON schema of the plugin's configuration object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,
    /// Requested permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Requested resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
}

impl PluginManifest {
    /// Returns the defaults declared in `configSchema.properties.*.default`.
    pub fn config_defaults(&self) -> serde_json::Map<String, Value> {
        let mut defaults = serde_json::Map::new();

        let properties = self
            .config_schema
            .as_ref()
            .and_then(|schema| schema.get("properties"))
            .and_then(|props| props.as_object());

        if let Some(properties) = properties {
            for (key, property) in properties {
                if let Some(default) = property.get("default") {
                    defaults.insert(key.clone(), default.clone());
                }
            }
        }

        defaults
    }
}

/// Which file a manifest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestSource {
    /// `plugin.json`.
    PluginFile,
    /// `package.json` → `umrPlugin`.
    PackageField,
}

/// A manifest together with where it was read from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// The normalized manifest.
    pub manifest: PluginManifest,
    /// Path of the file the manifest was read from.
    pub manifest_path: PathBuf,
    /// Which file format supplied it.
    pub source: ManifestSource,
    /// Number of manifest files read while probing the directory.
    pub files_read: usize,
}

/// Reads the manifest of a candidate plugin directory.
///
/// Returns `Ok(None)` when the directory is not a plugin: neither file
/// exists, the primary file is unparsable and no fallback exists, or the
/// fallback is malformed. Only unexpected I/O failures are errors.
pub async fn load_manifest(dir: &Path) -> AppResult<Option<LoadedManifest>> {
    let (loaded, _) = probe(dir).await?;
    Ok(loaded)
}

/// Like [`load_manifest`] but also reports how many files were read.
pub(crate) async fn probe(dir: &Path) -> AppResult<(Option<LoadedManifest>, usize)> {
    let mut files_read = 0;

    let manifest_path = dir.join(MANIFEST_FILE);
    if let Some(content) = read_optional(&manifest_path).await? {
        files_read += 1;
        match serde_json::from_slice::<PluginManifest>(&content) {
            Ok(manifest) => {
                debug!(path = %manifest_path.display(), "Loaded plugin manifest");
                return Ok((
                    Some(LoadedManifest {
                        manifest,
                        manifest_path,
                        source: ManifestSource::PluginFile,
                        files_read,
                    }),
                    files_read,
                ));
            }
            Err(e) => {
                warn!(
                    path = %manifest_path.display(),
                    error = %e,
                    "Unparsable plugin manifest, trying package descriptor"
                );
            }
        }
    }

    let package_path = dir.join(PACKAGE_FILE);
    let Some(content) = read_optional(&package_path).await? else {
        return Ok((None, files_read));
    };
    files_read += 1;

    // Unrelated or malformed package descriptors are simply not plugins.
    let manifest = serde_json::from_slice::<Value>(&content)
        .ok()
        .and_then(|mut package| package.get_mut(PACKAGE_FIELD).map(Value::take))
        .filter(Value::is_object)
        .and_then(|field| serde_json::from_value::<PluginManifest>(field).ok());

    let loaded = manifest.map(|manifest| {
        debug!(path = %package_path.display(), "Loaded plugin manifest from package descriptor");
        LoadedManifest {
            manifest,
            manifest_path: package_path,
            source: ManifestSource::PackageField,
            files_read,
        }
    });

    Ok((loaded, files_read))
}

/// Reads a file's raw bytes, mapping "does not exist" to `None`.
///
/// Content is decoded by the JSON parser, so invalid UTF-8 counts as
/// unparsable rather than as an I/O failure.
async fn read_optional(path: &Path) -> AppResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
