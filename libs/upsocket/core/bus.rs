//! Topic-keyed publish/subscribe registry
//!
//! Handlers are plain closures behind an [`Arc`]; the `Arc` is also the
//! handler's identity, so keep a clone of it to unsubscribe later.
//!
//! ```ignore
//! let bus = EventBus::<String>::new();
//! let h = handler(|msg: &String| println!("got {msg}"));
//!
//! bus.subscribe("chat", h.clone());
//! bus.publish("chat", &"hello".to_string());
//! bus.unsubscribe("chat", &h);
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Shared event handler
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<E, F>(f: F) -> Handler<E>
where
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Synchronous topic-based event bus
///
/// Cloning the bus yields another handle onto the same registry.
pub struct EventBus<E> {
    listeners: Arc<Mutex<HashMap<String, Vec<Handler<E>>>>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append `handler` to the topic's handler list
    ///
    /// Subscribing the same handler twice makes it run twice per publish.
    pub fn subscribe(&self, topic: impl Into<String>, handler: Handler<E>) {
        self.listeners
            .lock()
            .entry(topic.into())
            .or_default()
            .push(handler);
    }

    /// Remove the first occurrence of `handler` from the topic
    ///
    /// Returns whether anything was removed. Unknown topics and handlers are
    /// a no-op.
    pub fn unsubscribe(&self, topic: impl AsRef<str>, handler: &Handler<E>) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(handlers) = listeners.get_mut(topic.as_ref()) else {
            return false;
        };

        match handlers.iter().position(|h| same_handler(h, handler)) {
            Some(index) => {
                handlers.remove(index);
                if handlers.is_empty() {
                    listeners.remove(topic.as_ref());
                }
                true
            }
            None => false,
        }
    }

    /// Invoke every handler registered for `topic`, in subscription order
    ///
    /// The handler list is snapshotted before dispatch and the registry lock
    /// is released, so handlers may subscribe or unsubscribe freely; changes
    /// apply from the next publish on. A panicking handler is logged and the
    /// remaining handlers still run. Returns the number of handlers invoked.
    pub fn publish(&self, topic: impl AsRef<str>, event: &E) -> usize {
        let topic = topic.as_ref();
        let snapshot: Vec<Handler<E>> = match self.listeners.lock().get(topic) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        for handler in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Handler for topic '{}' panicked", topic);
            }
        }

        snapshot.len()
    }

    /// Number of handlers currently registered for `topic`
    pub fn handler_count(&self, topic: impl AsRef<str>) -> usize {
        self.listeners
            .lock()
            .get(topic.as_ref())
            .map_or(0, Vec::len)
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Forward the topic's events into an unbounded channel
    ///
    /// Returns the receiver together with the forwarding handler, which can
    /// be passed to [`EventBus::unsubscribe`] to stop forwarding. Events
    /// published after the receiver is dropped are discarded.
    pub fn channel(
        &self,
        topic: impl Into<String>,
    ) -> (crossbeam_channel::Receiver<E>, Handler<E>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let forward: Handler<E> = Arc::new(move |event: &E| {
            let _ = tx.send(event.clone());
        });

        self.subscribe(topic, Arc::clone(&forward));
        (rx, forward)
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        let mut topics: Vec<(&String, usize)> =
            listeners.iter().map(|(t, h)| (t, h.len())).collect();
        topics.sort();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

// Compare allocations only; vtable pointers for the same closure type can differ
// across codegen units.
fn same_handler<E>(a: &Handler<E>, b: &Handler<E>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
