//! Hook dispatcher: threads a payload through every handler of an event.
//!
//! - Handlers run sequentially in descending priority order, ties in
//!   registration order.
//! - A handler's `data` replaces the payload seen by the next handler.
//! - `continue: false` stops the chain and returns the payload as of that
//!   handler.
//! - A failing, panicking, or timed-out handler is logged and skipped; the
//!   next handler receives the last good payload.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use umr_core::result::AppResult;

use super::definitions::{HookEvent, HookOutcome};
use super::registry::{HookRegistration, HookRegistry};

/// A handler that did not complete normally.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Plugin owning the handler.
    pub plugin_id: String,
    /// What went wrong.
    pub reason: String,
}

/// Aggregated result of dispatching an event to all handlers.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Final payload.
    pub data: Value,
    /// Plugin ids whose handlers completed, in execution order.
    pub executed: Vec<String>,
    /// Plugin that stopped the chain, if any.
    pub stopped_by: Option<String>,
    /// Handlers that failed and were skipped.
    pub failures: Vec<HandlerFailure>,
}

/// Dispatches hook events to all registered handlers.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
    /// Per-handler time budget.
    handler_timeout: Duration,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<HookRegistry>, handler_timeout: Duration) -> Self {
        Self {
            registry,
            handler_timeout,
        }
    }

    /// Runs every handler for `event` and returns the final payload.
    ///
    /// Handler errors never reach the caller.
    pub async fn execute_hooks(&self, event: HookEvent, data: Value) -> Value {
        self.dispatch(event, data).await.data
    }

    /// Typed wrapper around [`execute_hooks`](Self::execute_hooks).
    ///
    /// Fails only if the payload cannot be converted to or from JSON.
    pub async fn execute_hooks_typed<T>(&self, event: HookEvent, data: T) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let value = serde_json::to_value(data)?;
        let result = self.execute_hooks(event, value).await;
        Ok(serde_json::from_value(result)?)
    }

    /// Runs every handler for `event` and reports what happened.
    pub async fn dispatch(&self, event: HookEvent, data: Value) -> DispatchResult {
        let handlers = self.registry.get_handlers(event).await;

        let mut result = DispatchResult {
            data,
            executed: Vec::new(),
            stopped_by: None,
            failures: Vec::new(),
        };

        if handlers.is_empty() {
            return result;
        }

        debug!(
            hook = %event,
            handler_count = handlers.len(),
            "Dispatching hook"
        );

        for registration in &handlers {
            match self.invoke(registration, result.data.clone()).await {
                Ok(outcome) => {
                    result.executed.push(registration.plugin_id.clone());

                    if let Some(data) = outcome.data {
                        result.data = data;
                    }

                    if !outcome.proceed {
                        info!(
                            hook = %event,
                            plugin_id = %registration.plugin_id,
                            "Handler stopped the hook chain"
                        );
                        result.stopped_by = Some(registration.plugin_id.clone());
                        break;
                    }
                }
                Err(reason) => {
                    result.failures.push(HandlerFailure {
                        plugin_id: registration.plugin_id.clone(),
                        reason,
                    });
                }
            }
        }

        result
    }

    /// Invokes one handler with timeout and panic isolation.
    async fn invoke(
        &self,
        registration: &HookRegistration,
        data: Value,
    ) -> Result<HookOutcome, String> {
        let event = registration.event;
        let plugin_id = &registration.plugin_id;

        let call = AssertUnwindSafe(registration.handler.handle(data, &registration.context))
            .catch_unwind();

        match tokio::time::timeout(self.handler_timeout, call).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(e))) => {
                warn!(
                    hook = %event,
                    plugin_id = %plugin_id,
                    error = %e,
                    "Hook handler failed, continuing"
                );
                Err(e.to_string())
            }
            Ok(Err(_)) => {
                error!(hook = %event, plugin_id = %plugin_id, "Hook handler panicked, continuing");
                Err("handler panicked".to_string())
            }
            Err(_) => {
                error!(
                    hook = %event,
                    plugin_id = %plugin_id,
                    timeout_ms = self.handler_timeout.as_millis() as u64,
                    "Hook handler timed out, continuing"
                );
                Err(format!(
                    "handler timed out after {} ms",
                    self.handler_timeout.as_millis()
                ))
            }
        }
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }
}
