//! Plugin discovery: scans root directories for plugin subdirectories.
//!
//! Discovery only reads manifests; it never loads plugin code. Failures
//! are collected and returned next to the plugins that were found: an
//! inaccessible root or a broken plugin directory never aborts the scan.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use umr_core::config::PluginManagerConfig;
use umr_core::result::AppResult;

use crate::manifest::{self, PluginMetadata};
use crate::validator::{StructureValidator, entry_point};

/// A plugin directory found during discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPlugin {
    /// Plugin directory.
    pub path: PathBuf,
    /// Manifest metadata.
    pub metadata: PluginMetadata,
    /// File the manifest was read from.
    pub manifest_path: PathBuf,
    /// Resolved entry point.
    pub entry_point: PathBuf,
    /// Whether the structure validator accepted the plugin.
    pub valid: bool,
    /// Validation errors.
    pub errors: Vec<String>,
    /// Validation warnings.
    pub warnings: Vec<String>,
    /// Structural security score.
    pub security_score: u8,
}

/// A path-scoped scan failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryError {
    /// Root or plugin directory the failure belongs to.
    pub path: PathBuf,
    /// What went wrong.
    pub message: String,
}

/// Scan statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Wall-clock duration of the scan in milliseconds.
    pub scan_duration_ms: u64,
    /// Number of candidate subdirectories inspected.
    pub directories_scanned: usize,
    /// Number of manifest files read.
    pub files_scanned: usize,
}

/// Aggregated discovery output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Plugins found, in root order then directory-name order.
    pub plugins: Vec<DiscoveredPlugin>,
    /// Non-fatal failures.
    pub errors: Vec<DiscoveryError>,
    /// Scan statistics.
    pub metadata: ScanMetadata,
}

impl DiscoveryResult {
    /// Plugins that passed validation.
    pub fn valid_plugins(&self) -> impl Iterator<Item = &DiscoveredPlugin> {
        self.plugins.iter().filter(|p| p.valid)
    }

    fn merge(&mut self, other: DiscoveryResult) {
        self.plugins.extend(other.plugins);
        self.errors.extend(other.errors);
        self.metadata.directories_scanned += other.metadata.directories_scanned;
        self.metadata.files_scanned += other.metadata.files_scanned;
    }
}

/// Walks configured roots and inspects every immediate subdirectory.
#[derive(Debug, Clone)]
pub struct PluginDiscovery {
    /// Root directories.
    roots: Vec<PathBuf>,
    /// Validator applied to every manifest.
    validator: StructureValidator,
    /// Number of roots scanned concurrently.
    concurrency: usize,
}

impl PluginDiscovery {
    /// Creates a discovery engine from the manager configuration.
    pub fn new(config: &PluginManagerConfig) -> Self {
        Self::with_roots(
            config.plugin_dirs.clone(),
            StructureValidator::new(config),
            config.max_concurrency,
        )
    }

    /// Creates a discovery engine over explicit roots.
    pub fn with_roots(
        roots: Vec<PathBuf>,
        validator: StructureValidator,
        concurrency: usize,
    ) -> Self {
        Self {
            roots,
            validator,
            concurrency: concurrency.max(1),
        }
    }

    /// Returns the configured roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Scans every root.
    pub async fn discover(&self) -> DiscoveryResult {
        let started = Instant::now();

        let scans: Vec<DiscoveryResult> = futures::stream::iter(self.roots.iter())
            .map(|root| self.scan_root(root))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut result = DiscoveryResult::default();
        for scan in scans {
            result.merge(scan);
        }
        result.metadata.scan_duration_ms = started.elapsed().as_millis() as u64;

        info!(
            plugins = result.plugins.len(),
            errors = result.errors.len(),
            directories = result.metadata.directories_scanned,
            duration_ms = result.metadata.scan_duration_ms,
            "Plugin discovery finished"
        );

        result
    }

    /// Scans the immediate subdirectories of one root.
    async fn scan_root(&self, root: &Path) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();

        let mut candidates = match list_subdirectories(root).await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Plugin root is not accessible");
                result.errors.push(DiscoveryError {
                    path: root.to_path_buf(),
                    message: format!("Directory not accessible: {e}"),
                });
                return result;
            }
        };
        candidates.sort();

        for dir in candidates {
            result.metadata.directories_scanned += 1;

            match self.inspect_counting(&dir).await {
                Ok((Some(plugin), files)) => {
                    result.metadata.files_scanned += files;
                    debug!(
                        plugin_id = %plugin.metadata.id,
                        path = %dir.display(),
                        valid = plugin.valid,
                        "Found plugin"
                    );
                    result.plugins.push(plugin);
                }
                Ok((None, files)) => {
                    result.metadata.files_scanned += files;
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to inspect plugin directory");
                    result.errors.push(DiscoveryError {
                        path: dir,
                        message: e.to_string(),
                    });
                }
            }
        }

        result
    }

    /// Inspects a single directory: manifest, then structure validation.
    ///
    /// Returns `Ok(None)` if the directory is not a plugin.
    pub async fn inspect(&self, dir: &Path) -> AppResult<Option<DiscoveredPlugin>> {
        Ok(self.inspect_counting(dir).await?.0)
    }

    async fn inspect_counting(&self, dir: &Path) -> AppResult<(Option<DiscoveredPlugin>, usize)> {
        let (loaded, files) = manifest::probe(dir).await?;
        let Some(loaded) = loaded else {
            return Ok((None, files));
        };

        let report = self.validator.validate(dir, &loaded.manifest).await;

        let plugin = DiscoveredPlugin {
            path: dir.to_path_buf(),
            entry_point: entry_point(dir, &loaded.manifest),
            metadata: loaded.manifest.metadata,
            manifest_path: loaded.manifest_path,
            valid: report.valid,
            errors: report.errors,
            warnings: report.warnings,
            security_score: report.security.score,
        };

        Ok((Some(plugin), files))
    }
}

/// Lists the immediate subdirectories of `root`.
async fn list_subdirectories(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut dirs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }

    Ok(dirs)
}
