//! Shared event emitter and its per-plugin facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;

/// Callback invoked when an event is emitted.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by `on`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Host-wide emitter shared by every plugin context.
pub struct EventEmitter {
    /// Event name → listeners in subscription order.
    listeners: DashMap<String, Vec<(ListenerId, Listener)>>,
    /// Next listener id.
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("events", &self.listeners.len())
            .finish()
    }
}

impl EventEmitter {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes `listener` to `event`.
    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes one listener. Returns whether it was subscribed.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let Some(mut entries) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(listener_id, _)| *listener_id != id);
        let removed = entries.len() != before;
        let empty = entries.is_empty();
        drop(entries);

        if empty {
            self.listeners.remove_if(event, |_, entries| entries.is_empty());
        }
        removed
    }

    /// Calls every listener of `event` and returns how many ran.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        // Snapshot first so listeners may subscribe or unsubscribe.
        let listeners: Vec<Listener> = match self.listeners.get(event) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    /// Number of listeners subscribed to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|e| e.len()).unwrap_or(0)
    }

    /// Drops every listener of every event starting with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.listeners.retain(|event, entries| {
            if event.starts_with(prefix) {
                removed += entries.len();
                false
            } else {
                true
            }
        });
        removed
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-plugin view of the shared emitter.
///
/// Event names are namespaced as `<plugin id>:<event>`, so a plugin only
/// ever hears its own events.
#[derive(Debug, Clone)]
pub struct PluginEvents {
    prefix: String,
    emitter: Arc<EventEmitter>,
}

impl PluginEvents {
    /// Creates the facade for `plugin_id`.
    pub fn new(plugin_id: &str, emitter: Arc<EventEmitter>) -> Self {
        Self {
            prefix: format!("{plugin_id}:"),
            emitter,
        }
    }

    fn qualify(&self, event: &str) -> String {
        format!("{}{}", self.prefix, event)
    }

    /// Subscribes to one of this plugin's events.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.emitter.on(&self.qualify(event), Arc::new(listener))
    }

    /// Unsubscribes a listener.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.emitter.off(&self.qualify(event), id)
    }

    /// Emits one of this plugin's events.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        self.emitter.emit(&self.qualify(event), payload)
    }

    /// Drops every listener this plugin registered.
    pub fn clear(&self) -> usize {
        self.emitter.remove_prefix(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_plugins_do_not_hear_each_other() {
        let emitter = Arc::new(EventEmitter::new());
        let a = PluginEvents::new("a", emitter.clone());
        let b = PluginEvents::new("b", emitter.clone());

        let heard = Arc::new(AtomicUsize::new(0));
        let counter = heard.clone();
        a.on("ready", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(b.emit("ready", &Value::Null), 0);
        assert_eq!(a.emit("ready", &Value::Null), 1);
        assert_eq!(heard.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("a:ready"), 1);
    }

    #[test]
    fn test_off_and_clear() {
        let emitter = Arc::new(EventEmitter::new());
        let a = PluginEvents::new("a", emitter.clone());
        let ab = PluginEvents::new("ab", emitter.clone());

        let first = a.on("x", |_| {});
        a.on("y", |_| {});
        ab.on("x", |_| {});

        assert!(a.off("x", first));
        assert!(!a.off("x", first));
        assert_eq!(a.clear(), 1);
        assert_eq!(emitter.listener_count("ab:x"), 1);
    }
}
