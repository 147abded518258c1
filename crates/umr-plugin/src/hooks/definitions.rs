//! Hook event definitions and handler outcomes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use umr_core::error::AppError;

/// Closed set of extension points in the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    // ── Validation ──
    /// Fired before a document is validated. Can transform the input.
    #[serde(rename = "validation:before")]
    ValidationBefore,
    /// Fired after validation with the collected results.
    #[serde(rename = "validation:after")]
    ValidationAfter,
    /// Fired before a single rule runs.
    #[serde(rename = "validation:rule:before")]
    ValidationRuleBefore,
    /// Fired after a single rule ran.
    #[serde(rename = "validation:rule:after")]
    ValidationRuleAfter,

    // ── Reporting ──
    /// Fired before a report is rendered.
    #[serde(rename = "report:before")]
    ReportBefore,
    /// Fired after a report is rendered.
    #[serde(rename = "report:after")]
    ReportAfter,

    // ── Autofix ──
    /// Fired before fixes are applied.
    #[serde(rename = "autofix:before")]
    AutofixBefore,
    /// Fired after fixes are applied.
    #[serde(rename = "autofix:after")]
    AutofixAfter,

    // ── Security ──
    /// Fired before a security scan.
    #[serde(rename = "security:scan:before")]
    SecurityScanBefore,
    /// Fired after a security scan.
    #[serde(rename = "security:scan:after")]
    SecurityScanAfter,

    // ── Performance ──
    /// Fired before performance analysis.
    #[serde(rename = "performance:analyze:before")]
    PerformanceAnalyzeBefore,
    /// Fired after performance analysis.
    #[serde(rename = "performance:analyze:after")]
    PerformanceAnalyzeAfter,

    // ── CLI ──
    /// Fired before a CLI command runs.
    #[serde(rename = "cli:command:before")]
    CliCommandBefore,
    /// Fired after a CLI command ran.
    #[serde(rename = "cli:command:after")]
    CliCommandAfter,
}

impl HookEvent {
    /// Every recognized hook event.
    pub const ALL: [HookEvent; 14] = [
        Self::ValidationBefore,
        Self::ValidationAfter,
        Self::ValidationRuleBefore,
        Self::ValidationRuleAfter,
        Self::ReportBefore,
        Self::ReportAfter,
        Self::AutofixBefore,
        Self::AutofixAfter,
        Self::SecurityScanBefore,
        Self::SecurityScanAfter,
        Self::PerformanceAnalyzeBefore,
        Self::PerformanceAnalyzeAfter,
        Self::CliCommandBefore,
        Self::CliCommandAfter,
    ];

    /// Returns the string name of this hook event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationBefore => "validation:before",
            Self::ValidationAfter => "validation:after",
            Self::ValidationRuleBefore => "validation:rule:before",
            Self::ValidationRuleAfter => "validation:rule:after",
            Self::ReportBefore => "report:before",
            Self::ReportAfter => "report:after",
            Self::AutofixBefore => "autofix:before",
            Self::AutofixAfter => "autofix:after",
            Self::SecurityScanBefore => "security:scan:before",
            Self::SecurityScanAfter => "security:scan:after",
            Self::PerformanceAnalyzeBefore => "performance:analyze:before",
            Self::PerformanceAnalyzeAfter => "performance:analyze:after",
            Self::CliCommandBefore => "cli:command:before",
            Self::CliCommandAfter => "cli:command:after",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|event| event.as_str() == s)
            .copied()
            .ok_or_else(|| AppError::validation(format!("Unknown hook event '{s}'")))
    }
}

/// What a handler tells the dispatcher after it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookOutcome {
    /// `false` stops the chain after this handler.
    #[serde(rename = "continue", default = "default_continue")]
    pub proceed: bool,
    /// Replacement payload for the next handler, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HookOutcome {
    /// Continue with the payload unchanged.
    pub fn pass() -> Self {
        Self {
            proceed: true,
            data: None,
        }
    }

    /// Continue with a replacement payload.
    pub fn replace(data: Value) -> Self {
        Self {
            proceed: true,
            data: Some(data),
        }
    }

    /// Stop the chain, leaving the payload unchanged.
    pub fn stop() -> Self {
        Self {
            proceed: false,
            data: None,
        }
    }

    /// Stop the chain with a final payload.
    pub fn stop_with(data: Value) -> Self {
        Self {
            proceed: false,
            data: Some(data),
        }
    }
}

fn default_continue() -> bool {
    true
}
