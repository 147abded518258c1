//! Validation collaborator traits.
//!
//! The plugin runtime registers rules into the host's rule table and lets
//! plugins invoke validation, but rule semantics belong to the host.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::result::AppResult;

/// Severity attached to a rule and its violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational finding.
    Info,
    /// Non-blocking finding.
    Warning,
    /// Blocking finding.
    Error,
}

/// A single finding produced by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Id of the rule that produced the finding.
    pub rule_id: String,
    /// Human-readable description.
    pub message: String,
    /// Location inside the validated document, if known.
    pub path: Option<String>,
    /// Finding severity.
    pub severity: Severity,
}

/// A validation rule contributed by a plugin.
#[async_trait]
pub trait ValidationRule: Send + Sync + std::fmt::Debug {
    /// Unique rule id (the rule table key).
    fn id(&self) -> &str;

    /// Short description of what the rule checks.
    fn description(&self) -> &str {
        ""
    }

    /// Default severity of the rule's findings.
    fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Checks a document and returns every violation found.
    async fn check(&self, input: &Value) -> AppResult<Vec<RuleViolation>>;
}

/// Host validation engine reachable through the plugin API facade.
#[async_trait]
pub trait ValidationEngine: Send + Sync {
    /// Validates `input` against the given rule set.
    async fn validate(
        &self,
        input: &Value,
        rules: &[Arc<dyn ValidationRule>],
    ) -> AppResult<Vec<RuleViolation>>;
}
