//! The `no-eval` validation rule.

use async_trait::async_trait;
use serde_json::Value;

use umr_core::result::AppResult;
use umr_core::traits::{RuleViolation, Severity, ValidationRule};

/// Rule id registered in the host rule table.
pub const RULE_ID: &str = "no-eval";

/// Patterns flagged when no others are configured.
pub const DEFAULT_PATTERNS: [&str; 3] = ["eval(", "new Function(", "setTimeout(\""];

/// Flags string values containing dynamic code evaluation.
///
/// Every string in the document is checked; violations carry the JSON
/// pointer of the offending value.
#[derive(Debug, Clone)]
pub struct NoEvalRule {
    patterns: Vec<String>,
}

impl NoEvalRule {
    /// Creates the rule with custom patterns.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    fn scan(&self, value: &Value, pointer: &mut String, out: &mut Vec<RuleViolation>) {
        match value {
            Value::String(text) => {
                if let Some(pattern) = self.patterns.iter().find(|p| text.contains(p.as_str())) {
                    out.push(RuleViolation {
                        rule_id: RULE_ID.to_string(),
                        message: format!("Dynamic code evaluation '{pattern}' is not allowed"),
                        path: Some(if pointer.is_empty() { "/".to_string() } else { pointer.clone() }),
                        severity: Severity::Error,
                    });
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&index.to_string());
                    self.scan(item, pointer, out);
                    pointer.truncate(len);
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
                    self.scan(item, pointer, out);
                    pointer.truncate(len);
                }
            }
            _ => {}
        }
    }
}

impl Default for NoEvalRule {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS)
    }
}

#[async_trait]
impl ValidationRule for NoEvalRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Disallow eval() and equivalent dynamic code evaluation"
    }

    async fn check(&self, input: &Value) -> AppResult<Vec<RuleViolation>> {
        let mut violations = Vec::new();
        self.scan(input, &mut String::new(), &mut violations);
        Ok(violations)
    }
}
