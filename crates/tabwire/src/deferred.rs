// One-shot latch used for "happened exactly once" signals: the frame-tree
// snapshot gate, target initialization, activation swap waits, and
// execution-context bindings.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};

/// A one-shot, multi-consumer latch.
///
/// `resolve` or `reject` settles the latch exactly once; the first settle
/// wins and every later settle is a no-op. Any number of tasks can `wait`
/// on it, before or after it settles, and each receives a clone of the
/// outcome. Cloning the `Deferred` clones a handle to the same latch.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<Option<Result<T>>>,
    notify: Notify,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// A latch that is already resolved.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// Settle with a value. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns false if already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_some() {
            return false;
        }
        *state = Some(outcome);
        drop(state);
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_settled(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    /// The settled outcome, if any, without waiting.
    pub fn value(&self) -> Option<Result<T>> {
        self.inner.state.lock().clone()
    }

    /// Wait until the latch settles and return a clone of the outcome.
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking state so a settle that races
            // with this check cannot be missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.inner.state.lock().clone() {
                return outcome;
            }
            notified.await;
        }
    }
}
