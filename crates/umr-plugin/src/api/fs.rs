//! Filesystem facade handed to plugins.
//!
//! When sandboxing is on, every path is resolved lexically and must land
//! inside the plugin's own directory or one of the configured extra roots.
//! Symlinks are not followed during the check.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use umr_core::config::SecurityConfig;
use umr_core::error::AppError;
use umr_core::result::AppResult;

/// Sandboxed file access for one plugin.
#[derive(Debug, Clone)]
pub struct SandboxedFs {
    plugin_id: Arc<str>,
    /// Allowed roots; the first is the plugin directory.
    roots: Vec<PathBuf>,
    sandboxed: bool,
    /// Operation budget (0 = unlimited).
    max_ops: u64,
    ops: Arc<AtomicU64>,
}

impl SandboxedFs {
    /// Creates the facade for a plugin living in `plugin_dir`.
    pub fn new(plugin_id: &str, plugin_dir: &Path, security: &SecurityConfig) -> Self {
        let mut roots = vec![normalize(plugin_dir)];
        roots.extend(security.fs_roots.iter().map(|r| normalize(r)));

        Self {
            plugin_id: Arc::from(plugin_id),
            roots,
            sandboxed: security.sandboxed,
            max_ops: security.resource_limits.max_file_access,
            ops: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The plugin directory.
    pub fn base_dir(&self) -> &Path {
        &self.roots[0]
    }

    /// Number of operations performed so far.
    pub fn operations(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    /// Resolves `path` against the plugin directory and checks the sandbox.
    pub fn resolve(&self, path: impl AsRef<Path>) -> AppResult<PathBuf> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        };
        let resolved = normalize(&joined);

        if self.sandboxed && !self.is_allowed(&resolved) {
            return Err(AppError::permission(format!(
                "Plugin '{}' may not access '{}'",
                self.plugin_id,
                path.display()
            )));
        }
        Ok(resolved)
    }

    fn is_allowed(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    fn charge(&self) -> AppResult<()> {
        let used = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
        if self.max_ops > 0 && used > self.max_ops {
            return Err(AppError::permission(format!(
                "Plugin '{}' exceeded its file access limit of {}",
                self.plugin_id, self.max_ops
            )));
        }
        Ok(())
    }

    /// Reads a UTF-8 file.
    pub async fn read_to_string(&self, path: impl AsRef<Path>) -> AppResult<String> {
        let resolved = self.resolve(path)?;
        self.charge()?;
        debug!(plugin_id = %self.plugin_id, path = %resolved.display(), "Plugin fs read");
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    /// Writes a file, creating parent directories as needed.
    pub async fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> AppResult<()> {
        let resolved = self.resolve(path)?;
        self.charge()?;
        debug!(plugin_id = %self.plugin_id, path = %resolved.display(), "Plugin fs write");
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, contents).await?;
        Ok(())
    }

    /// Whether `path` exists.
    pub async fn exists(&self, path: impl AsRef<Path>) -> AppResult<bool> {
        let resolved = self.resolve(path)?;
        self.charge()?;
        Ok(tokio::fs::try_exists(&resolved).await?)
    }

    /// Expands a glob pattern relative to the plugin directory.
    ///
    /// Matches outside the allowed roots are dropped.
    pub async fn glob(&self, pattern: &str) -> AppResult<Vec<PathBuf>> {
        if self.sandboxed
            && Path::new(pattern)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AppError::permission(format!(
                "Plugin '{}' may not glob outside its roots: '{pattern}'",
                self.plugin_id
            )));
        }
        self.charge()?;

        let full = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            self.base_dir().join(pattern)
        };
        let full = full.to_string_lossy().into_owned();

        let matches = tokio::task::spawn_blocking(move || -> AppResult<Vec<PathBuf>> {
            let paths = glob::glob(&full)
                .map_err(|e| AppError::validation(format!("Invalid glob pattern: {e}")))?;
            Ok(paths.filter_map(Result::ok).collect())
        })
        .await
        .map_err(|e| AppError::internal(format!("Glob task failed: {e}")))??;

        let mut matches: Vec<PathBuf> = matches
            .into_iter()
            .map(|p| normalize(&p))
            .filter(|p| !self.sandboxed || self.is_allowed(p))
            .collect();
        matches.sort();
        Ok(matches)
    }
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
