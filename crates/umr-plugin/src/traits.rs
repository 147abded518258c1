//! Convenience adapters for writing hook handlers and rules as closures.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use umr_core::result::AppResult;
use umr_core::traits::{RuleViolation, ValidationRule};

use crate::api::context::PluginContext;
use crate::hooks::definitions::HookOutcome;
use crate::hooks::registry::HookHandler;

type BoxedHookFuture = Pin<Box<dyn Future<Output = AppResult<HookOutcome>> + Send>>;

/// A closure-based hook handler.
///
/// The closure receives the payload and an owned clone of the plugin's
/// context, so the returned future may be `'static`.
pub struct ClosureHandler {
    name: String,
    handler: Arc<dyn Fn(Value, PluginContext) -> BoxedHookFuture + Send + Sync>,
}

impl std::fmt::Debug for ClosureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureHandler")
            .field("name", &self.name)
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureHandler {
    /// Creates a new closure-based handler.
    pub fn new<F, Fut>(name: &str, handler: F) -> Self
    where
        F: Fn(Value, PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<HookOutcome>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            handler: Arc::new(move |data, ctx| Box::pin(handler(data, ctx))),
        }
    }

    /// Wraps a closure into an `Arc<dyn HookHandler>`.
    pub fn wrap<F, Fut>(name: &str, handler: F) -> Arc<dyn HookHandler>
    where
        F: Fn(Value, PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<HookOutcome>> + Send + 'static,
    {
        Arc::new(Self::new(name, handler))
    }
}

#[async_trait]
impl HookHandler for ClosureHandler {
    async fn handle(&self, data: Value, ctx: &PluginContext) -> AppResult<HookOutcome> {
        (self.handler)(data, ctx.clone()).await
    }
}

/// A synchronous validation rule backed by a closure.
pub struct FnRule {
    id: String,
    description: String,
    check: Arc<dyn Fn(&Value) -> Vec<RuleViolation> + Send + Sync>,
}

impl std::fmt::Debug for FnRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRule").field("id", &self.id).finish()
    }
}

impl FnRule {
    /// Creates a rule with the given id and check.
    pub fn new<F>(id: &str, description: &str, check: F) -> Self
    where
        F: Fn(&Value) -> Vec<RuleViolation> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl ValidationRule for FnRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn check(&self, input: &Value) -> AppResult<Vec<RuleViolation>> {
        Ok((self.check)(input))
    }
}
