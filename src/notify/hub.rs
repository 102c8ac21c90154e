//! In-process change notification hub
//!
//! Writer sessions signal the hub after every durable commit; merge loops
//! subscribe and sleep on their listener between cycles. Delivery is
//! at-least-once with coalescing: each listener holds a single stored
//! permit, so a signal that arrives while the listener is mid-cycle is
//! kept (the next wait returns immediately) and a burst of signals
//! collapses into one wakeup. Signals carry no payload; the log itself is
//! the source of truth for what changed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use uuid::Uuid;

struct HubInner {
    listeners: Mutex<HashMap<Uuid, Arc<Notify>>>,
}

/// Shared signal fan-out for one store.
///
/// Cheap to clone; all clones share the listener registry.
#[derive(Clone)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

impl ChangeHub {
    /// Creates a hub with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers a new listener. The listener unsubscribes itself when
    /// dropped.
    pub fn subscribe(&self) -> ChangeListener {
        let id = Uuid::new_v4();
        let notify = Arc::new(Notify::new());
        self.inner
            .listeners
            .lock()
            .unwrap()
            .insert(id, notify.clone());
        ChangeListener {
            id,
            notify,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Wakes every listener, storing a permit for any that is not
    /// currently waiting.
    pub fn signal(&self) {
        let listeners = self.inner.listeners.lock().unwrap();
        for notify in listeners.values() {
            notify.notify_one();
        }
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's end of the hub.
pub struct ChangeListener {
    id: Uuid,
    notify: Arc<Notify>,
    hub: Weak<HubInner>,
}

impl ChangeListener {
    /// Waits until the store has (or may have) changed since the last
    /// return from this method. Returns immediately when a permit is
    /// already stored.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.listeners.lock().unwrap().remove(&self.id);
        }
    }
}
