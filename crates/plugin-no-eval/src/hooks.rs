//! Hook handlers for the no-eval plugin.

use async_trait::async_trait;
use serde_json::{Value, json};

use umr_core::result::AppResult;
use umr_plugin::api::context::PluginContext;
use umr_plugin::hooks::definitions::HookOutcome;
use umr_plugin::hooks::registry::HookHandler;

use crate::rule::RULE_ID;

/// Storage key counting documents scanned.
pub const SCANS_KEY: &str = "scans";
/// Storage key counting documents with findings.
pub const FLAGGED_KEY: &str = "flagged";

/// `validation:before`: scans the document and annotates or blocks it.
///
/// With `block: true` in the plugin config, a flagged document stops the
/// chain and is replaced by a rejection.
#[derive(Debug, Default)]
pub struct ScanBeforeValidation;

#[async_trait]
impl HookHandler for ScanBeforeValidation {
    async fn handle(&self, data: Value, ctx: &PluginContext) -> AppResult<HookOutcome> {
        let violations = ctx.api.validate(&data, &[RULE_ID]).await?;

        bump(ctx, SCANS_KEY);
        if violations.is_empty() {
            return Ok(HookOutcome::pass());
        }
        bump(ctx, FLAGGED_KEY);

        ctx.logger
            .warn(&format!("{} eval finding(s) in document", violations.len()));

        let block = ctx.config.get("block").and_then(Value::as_bool).unwrap_or(false);
        if block {
            return Ok(HookOutcome::stop_with(json!({
                "rejected": true,
                "reason": "dynamic code evaluation",
                "violations": violations,
            })));
        }

        let mut annotated = data;
        if let Value::Object(map) = &mut annotated {
            map.insert("noEval".to_string(), json!({ "violations": violations }));
        }
        Ok(HookOutcome::replace(annotated))
    }
}

/// `report:after`: appends scan totals to the report.
#[derive(Debug, Default)]
pub struct AppendSummary;

#[async_trait]
impl HookHandler for AppendSummary {
    async fn handle(&self, data: Value, ctx: &PluginContext) -> AppResult<HookOutcome> {
        let Value::Object(mut report) = data else {
            return Ok(HookOutcome::pass());
        };

        report.insert(
            "noEval".to_string(),
            json!({
                "scanned": count(ctx, SCANS_KEY),
                "flagged": count(ctx, FLAGGED_KEY),
            }),
        );
        Ok(HookOutcome::replace(Value::Object(report)))
    }
}

fn count(ctx: &PluginContext, key: &str) -> u64 {
    ctx.storage.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

fn bump(ctx: &PluginContext, key: &str) {
    ctx.storage.set(key, json!(count(ctx, key) + 1));
}
