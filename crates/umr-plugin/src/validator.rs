//! Structure validator: checks a manifest against its plugin directory.
//!
//! The security score is a baseline of 100 reduced by the structural
//! findings below. It is not the result of static analysis; a full score
//! means "nothing obviously wrong", not "safe".

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use umr_core::config::PluginManagerConfig;
use umr_core::error::AppError;
use umr_core::result::AppResult;

use crate::hooks::definitions::HookEvent;
use crate::manifest::PluginManifest;

/// Detached signature file required when signing is enforced.
pub const SIGNATURE_FILE: &str = "plugin.sig";

const BASELINE_SCORE: u8 = 100;
const BROAD_PERMISSION_PENALTY: u8 = 30;
const UNSIGNED_PENALTY: u8 = 20;

/// Permissions that grant unrestricted access.
const UNSAFE_PERMISSIONS: [&str; 2] = ["*", "unsafe"];

/// Security portion of a validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Baseline 100 minus penalties.
    pub score: u8,
    /// Findings that lowered the score.
    pub issues: Vec<String>,
    /// Suggested remediations.
    pub recommendations: Vec<String>,
}

impl Default for SecurityReport {
    fn default() -> Self {
        Self {
            score: BASELINE_SCORE,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

impl SecurityReport {
    fn penalize(&mut self, penalty: u8, issue: String, recommendation: &str) {
        self.score = self.score.saturating_sub(penalty);
        self.issues.push(issue);
        self.recommendations.push(recommendation.to_string());
    }
}

/// Outcome of validating one plugin directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// Blocking problems.
    pub errors: Vec<String>,
    /// Non-blocking problems.
    pub warnings: Vec<String>,
    /// Structural security findings.
    pub security: SecurityReport,
}

impl ValidationReport {
    /// Converts an invalid report into a validation error naming every problem.
    pub fn into_result(self, dir: &Path) -> AppResult<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(AppError::validation(format!(
                "Plugin at '{}' is invalid: {}",
                dir.display(),
                self.errors.join("; ")
            )))
        }
    }
}

/// Validates manifests and plugin directory structure.
#[derive(Debug, Clone, Default)]
pub struct StructureValidator {
    /// Accept plugins requesting unrestricted permissions.
    allow_unsafe: bool,
    /// Require a signature file.
    require_signing: bool,
}

impl StructureValidator {
    /// Creates a validator from the manager configuration.
    pub fn new(config: &PluginManagerConfig) -> Self {
        Self {
            allow_unsafe: config.allow_unsafe,
            require_signing: config.security.require_signing,
        }
    }

    /// Validates `manifest` against the contents of `dir`.
    pub async fn validate(&self, dir: &Path, manifest: &PluginManifest) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut security = SecurityReport::default();

        let id = manifest.metadata.id.as_str();
        if id.trim().is_empty() {
            errors.push("Missing required field 'metadata.id'".to_string());
        } else if !is_valid_id(id) {
            errors.push(format!(
                "Invalid plugin id '{id}': only ASCII letters, digits, '.', '_' and '-' are allowed"
            ));
        }
        if manifest.metadata.version.trim().is_empty() {
            errors.push("Missing required field 'metadata.version'".to_string());
        }
        if manifest.metadata.name.trim().is_empty() {
            warnings.push("Missing 'metadata.name'".to_string());
        }

        if manifest.main.trim().is_empty() {
            errors.push("Missing required field 'main'".to_string());
        } else if !is_contained(&manifest.main) {
            errors.push(format!(
                "Entry point '{}' escapes the plugin directory",
                manifest.main
            ));
        } else {
            let entry = entry_point(dir, manifest);
            match tokio::fs::try_exists(&entry).await {
                Ok(true) => {}
                Ok(false) => errors.push(format!(
                    "Entry point '{}' does not exist",
                    entry.display()
                )),
                Err(e) => errors.push(format!(
                    "Entry point '{}' is not accessible: {e}",
                    entry.display()
                )),
            }
        }

        for hook in &manifest.capabilities.hooks {
            if hook.parse::<HookEvent>().is_err() {
                warnings.push(format!("Unknown hook event '{hook}' in capabilities"));
            }
        }

        for permission in &manifest.permissions {
            if UNSAFE_PERMISSIONS.contains(&permission.as_str()) {
                let issue = format!("Requests unrestricted permission '{permission}'");
                if self.allow_unsafe {
                    warnings.push(issue.clone());
                } else {
                    errors.push(format!("{issue} (unsafe plugins are not allowed)"));
                }
                security.penalize(
                    BROAD_PERMISSION_PENALTY,
                    issue,
                    "Declare the narrowest permissions the plugin needs",
                );
            }
        }

        let signed = tokio::fs::try_exists(dir.join(SIGNATURE_FILE))
            .await
            .unwrap_or(false);
        if !signed {
            if self.require_signing {
                errors.push(format!("Missing signature file '{SIGNATURE_FILE}'"));
            }
            security.penalize(
                UNSIGNED_PENALTY,
                "Plugin is not signed".to_string(),
                "Ship a detached signature next to the manifest",
            );
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            security,
        }
    }
}

/// Resolves the manifest's entry point against the plugin directory.
pub fn entry_point(dir: &Path, manifest: &PluginManifest) -> PathBuf {
    dir.join(&manifest.main)
}

/// Whether `id` is safe to use as a storage and event namespace.
///
/// `:` separates the namespace from the key, so it can never appear here.
pub fn is_valid_id(id: &str) -> bool {
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Whether a relative path stays inside the directory it is joined to.
fn is_contained(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
