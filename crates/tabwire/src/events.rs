// Typed event fan-out.
//
// Each component owns an emitter over its own event enum, so a consumer
// cannot subscribe to a nonexistent event. Two delivery modes:
//
// - `on` registers a synchronous observer, invoked inline on the dispatch
//   path. This is what internal consumers use when they need to see an
//   event at arrival time, before any queued processing (the frame
//   manager's navigated-dedup bookkeeping depends on this).
// - `subscribe` returns a channel receiver for consumers that process at
//   their own pace. Dropped receivers are pruned on the next emit.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct EventEmitter<E> {
    inner: Mutex<Inner<E>>,
}

struct Inner<E> {
    listeners: Vec<Listener<E>>,
    subscribers: Vec<mpsc::UnboundedSender<E>>,
}

impl<E: Clone> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                listeners: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a synchronous observer, invoked inline for every emission.
    pub fn on(&self, listener: impl Fn(&E) + Send + Sync + 'static) {
        self.inner.lock().listeners.push(Arc::new(listener));
    }

    /// Register a channel subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    pub fn emit(&self, event: E) {
        // Snapshot listeners so a callback can register new ones (or emit)
        // without deadlocking on the inner lock.
        let listeners: Vec<Listener<E>> = self.inner.lock().listeners.clone();
        for listener in &listeners {
            listener(&event);
        }
        self.inner
            .lock()
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
