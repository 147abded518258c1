//! Manager-level lifecycle events for host observers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the lifecycle event channel.
const CHANNEL_CAPACITY: usize = 256;

/// A lifecycle transition published by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PluginEvent {
    /// `plugin:loaded`
    Loaded {
        /// Plugin id.
        plugin_id: String,
    },
    /// `plugin:activated`
    Activated {
        /// Plugin id.
        plugin_id: String,
    },
    /// `plugin:deactivated`
    Deactivated {
        /// Plugin id.
        plugin_id: String,
    },
    /// `plugin:unloaded`
    Unloaded {
        /// Plugin id.
        plugin_id: String,
    },
    /// `plugin:error`
    Error {
        /// Plugin id.
        plugin_id: String,
        /// Error message.
        error: String,
    },
}

impl PluginEvent {
    /// The event's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "plugin:loaded",
            Self::Activated { .. } => "plugin:activated",
            Self::Deactivated { .. } => "plugin:deactivated",
            Self::Unloaded { .. } => "plugin:unloaded",
            Self::Error { .. } => "plugin:error",
        }
    }

    /// The plugin the event is about.
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::Loaded { plugin_id }
            | Self::Activated { plugin_id }
            | Self::Deactivated { plugin_id }
            | Self::Unloaded { plugin_id }
            | Self::Error { plugin_id, .. } => plugin_id,
        }
    }
}

/// Broadcast bus carrying [`PluginEvent`]s.
#[derive(Debug, Clone)]
pub struct PluginEventBus {
    sender: broadcast::Sender<PluginEvent>,
}

impl PluginEventBus {
    /// Creates a bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event; no subscribers is not an error.
    pub fn publish(&self, event: PluginEvent) {
        trace!(event = event.name(), plugin_id = %event.plugin_id(), "Publishing plugin event");
        let _ = self.sender.send(event);
    }

    /// Subscribes to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }
}

impl Default for PluginEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = PluginEventBus::new();
        bus.publish(PluginEvent::Loaded {
            plugin_id: "early".into(),
        });

        let mut rx = bus.subscribe();
        bus.publish(PluginEvent::Error {
            plugin_id: "a".into(),
            error: "boom".into(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "plugin:error");
        assert_eq!(event.plugin_id(), "a");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "error", "plugin_id": "a", "error": "boom"})
        );
    }
}
