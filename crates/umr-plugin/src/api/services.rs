//! Host services and the restricted API facade handed to plugins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use umr_core::error::AppError;
use umr_core::result::AppResult;
use umr_core::traits::{ReportGenerator, RuleViolation, ValidationEngine, ValidationRule};

use super::fs::SandboxedFs;
use crate::rules::RuleTable;

/// Host collaborators reachable through [`PluginApi`].
#[derive(Clone)]
pub struct HostServices {
    /// Validation engine.
    pub validator: Arc<dyn ValidationEngine>,
    /// Report generator.
    pub reporter: Arc<dyn ReportGenerator>,
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish()
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            validator: Arc::new(SequentialValidationEngine),
            reporter: Arc::new(JsonReportGenerator),
        }
    }
}

/// Runs each rule in order and concatenates the findings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialValidationEngine;

#[async_trait]
impl ValidationEngine for SequentialValidationEngine {
    async fn validate(
        &self,
        input: &Value,
        rules: &[Arc<dyn ValidationRule>],
    ) -> AppResult<Vec<RuleViolation>> {
        let mut violations = Vec::new();
        for rule in rules {
            violations.extend(rule.check(input).await?);
        }
        Ok(violations)
    }
}

/// Renders reports as JSON or as `key: value` text lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportGenerator;

#[async_trait]
impl ReportGenerator for JsonReportGenerator {
    async fn generate(&self, data: &Value, format: &str) -> AppResult<String> {
        match format {
            "json" => Ok(serde_json::to_string_pretty(data)?),
            "text" => Ok(match data {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => other.to_string(),
            }),
            other => Err(AppError::validation(format!(
                "Unsupported report format '{other}'"
            ))),
        }
    }
}

/// The only route from plugin code to host functionality.
#[derive(Debug, Clone)]
pub struct PluginApi {
    plugin_id: Arc<str>,
    host: HostServices,
    rules: Arc<RuleTable>,
    fs: SandboxedFs,
    /// Open only while the plugin is activating or active.
    registration_open: Arc<AtomicBool>,
}

impl PluginApi {
    /// Creates the facade for one plugin.
    pub fn new(plugin_id: &str, host: HostServices, rules: Arc<RuleTable>, fs: SandboxedFs) -> Self {
        Self {
            plugin_id: Arc::from(plugin_id),
            host,
            rules,
            fs,
            registration_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allows or refuses `register_rule`; the lifecycle manager opens it on
    /// activation and closes it on deactivation or failure.
    pub(crate) fn set_registration_open(&self, open: bool) {
        self.registration_open.store(open, Ordering::SeqCst);
    }

    /// Validates `input` against the named rules, or against every
    /// registered rule when `rule_ids` is empty.
    pub async fn validate(&self, input: &Value, rule_ids: &[&str]) -> AppResult<Vec<RuleViolation>> {
        let rules = if rule_ids.is_empty() {
            self.rules.rules().await
        } else {
            let mut selected = Vec::with_capacity(rule_ids.len());
            for id in rule_ids {
                let rule = self
                    .rules
                    .get(id)
                    .await
                    .ok_or_else(|| AppError::not_found(format!("Validation rule '{id}' not found")))?;
                selected.push(rule);
            }
            selected
        };

        self.host.validator.validate(input, &rules).await
    }

    /// Renders a report through the host generator.
    pub async fn generate_report(&self, data: &Value, format: &str) -> AppResult<String> {
        self.host.reporter.generate(data, format).await
    }

    /// Registers a validation rule owned by this plugin.
    ///
    /// Only allowed while the plugin is activating or active; the rule is
    /// retracted with the rest of the plugin's capabilities.
    pub async fn register_rule(&self, rule: Arc<dyn ValidationRule>) -> AppResult<()> {
        if !self.registration_open.load(Ordering::SeqCst) {
            return Err(AppError::invalid_state(format!(
                "Plugin '{}' can only register rules while activating or active",
                self.plugin_id
            )));
        }
        self.rules.register(&self.plugin_id, rule).await
    }

    /// Sandboxed filesystem access.
    pub fn fs(&self) -> &SandboxedFs {
        &self.fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use umr_core::config::SecurityConfig;
    use umr_core::error::ErrorKind;
    use umr_core::traits::Severity;

    #[derive(Debug)]
    struct ForbidKey(&'static str);

    #[async_trait]
    impl ValidationRule for ForbidKey {
        fn id(&self) -> &str {
            self.0
        }

        async fn check(&self, input: &Value) -> AppResult<Vec<RuleViolation>> {
            Ok(input
                .get(self.0)
                .map(|_| RuleViolation {
                    rule_id: self.0.to_string(),
                    message: format!("'{}' is forbidden", self.0),
                    path: Some(self.0.to_string()),
                    severity: Severity::Error,
                })
                .into_iter()
                .collect())
        }
    }

    fn api(id: &str, rules: Arc<RuleTable>) -> PluginApi {
        let dir = std::env::temp_dir();
        let fs = SandboxedFs::new(id, &dir, &SecurityConfig::default());
        PluginApi::new(id, HostServices::default(), rules, fs)
    }

    #[tokio::test]
    async fn test_register_and_validate() {
        let rules = Arc::new(RuleTable::new());
        let api = api("p", rules.clone());
        api.set_registration_open(true);
        api.register_rule(Arc::new(ForbidKey("eval"))).await.unwrap();
        api.register_rule(Arc::new(ForbidKey("exec"))).await.unwrap();
        assert_eq!(rules.owner_of("eval").await.as_deref(), Some("p"));

        let input = json!({"eval": true, "exec": true});
        assert_eq!(api.validate(&input, &[]).await.unwrap().len(), 2);
        assert_eq!(api.validate(&input, &["exec"]).await.unwrap().len(), 1);

        let err = api.validate(&input, &["missing"]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_register_rule_requires_open_registration() {
        let rules = Arc::new(RuleTable::new());
        let api = api("p", rules.clone());

        let err = api.register_rule(Arc::new(ForbidKey("eval"))).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert!(rules.is_empty().await);

        // Clones share the gate with the context they came from
        let clone = api.clone();
        api.set_registration_open(true);
        clone.register_rule(Arc::new(ForbidKey("eval"))).await.unwrap();
        api.set_registration_open(false);
        assert!(clone.register_rule(Arc::new(ForbidKey("exec"))).await.is_err());
        assert_eq!(rules.len().await, 1);
    }

    #[tokio::test]
    async fn test_report_formats() {
        let api = api("p", Arc::new(RuleTable::new()));
        let data = json!({"lines": 3});

        assert_eq!(api.generate_report(&data, "text").await.unwrap(), "lines: 3");
        assert!(api.generate_report(&data, "json").await.unwrap().contains("\"lines\""));
        assert!(api.generate_report(&data, "pdf").await.is_err());
    }
}
