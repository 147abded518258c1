//! Per-plugin logger.

use std::sync::Arc;

/// Logger that tags every message with the owning plugin id.
///
/// Messages go through `tracing` under the `umr_plugin::plugin` target with
/// a `plugin_id` field and a `[<plugin id>] ` prefix.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin_id: Arc<str>,
}

impl PluginLogger {
    /// Creates a logger for `plugin_id`.
    pub fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: Arc::from(plugin_id),
        }
    }

    /// Returns the message as it will be logged.
    pub fn format(&self, message: &str) -> String {
        format!("[{}] {}", self.plugin_id, message)
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        tracing::debug!(target: "umr_plugin::plugin", plugin_id = %self.plugin_id, "{}", self.format(message));
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        tracing::info!(target: "umr_plugin::plugin", plugin_id = %self.plugin_id, "{}", self.format(message));
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        tracing::warn!(target: "umr_plugin::plugin", plugin_id = %self.plugin_id, "{}", self.format(message));
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        tracing::error!(target: "umr_plugin::plugin", plugin_id = %self.plugin_id, "{}", self.format(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix() {
        let logger = PluginLogger::new("rule-x");
        assert_eq!(logger.format("ready"), "[rule-x] ready");
    }
}
