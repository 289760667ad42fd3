//! Lifecycle notifications.
//!
//! Components that cache state derived from the installed plugin set (the
//! error-code table) subscribe here and rebuild when the set changes.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    RuntimeStarted,
    PluginStarted(String),
    PluginStopped(String),
}

pub trait LifecycleListener: Send + Sync + 'static {
    fn on_event(&self, event: &LifecycleEvent);
}

#[derive(Default)]
pub struct Lifecycle {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.write().push(listener);
    }

    /// Delivers `event` to every listener in subscription order.
    pub fn emit(&self, event: LifecycleEvent) {
        let listeners = self.listeners.read().clone();
        debug!(?event, listeners = listeners.len(), "lifecycle event");
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}
