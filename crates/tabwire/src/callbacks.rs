// Pending-command bookkeeping.
//
// Every outbound command gets a registry entry keyed by a strictly
// increasing id. The entry is settled by a matching reply, by a timeout,
// or wholesale by `clear` when the owning transport or session goes away.
// Late or duplicate replies find no entry and are dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::message::RequestId;

struct PendingCall {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

/// Maps outgoing request ids to pending result futures.
///
/// The connection owns one registry; every session owns its own. Ids are
/// unique per registry instance and never reused while pending (they are
/// never reused at all — the counter only goes up).
pub struct CallbackRegistry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending call and perform the actual send through `writer`.
    ///
    /// The writer receives the allocated id and does the transport write; if
    /// it fails, the entry is cleaned up and the error is returned to the
    /// caller directly. Otherwise the call resolves when a matching reply
    /// arrives, rejects on `timeout` (a reply arriving after that is a
    /// no-op), or rejects when the registry is cleared on disconnect.
    pub async fn create<F, Fut>(
        &self,
        method: &str,
        timeout: Option<Duration>,
        writer: F,
    ) -> Result<Value>
    where
        F: FnOnce(RequestId) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingCall {
                method: method.to_string(),
                created_at: Instant::now(),
                tx,
            },
        );

        if let Err(err) = writer(id).await {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(settled) => Self::unwrap_settled(settled, method),
                Err(_elapsed) => {
                    self.pending.lock().remove(&id);
                    Err(Error::Timeout {
                        method: method.to_string(),
                        timeout: limit,
                    })
                }
            },
            None => Self::unwrap_settled(rx.await, method),
        }
    }

    fn unwrap_settled(
        settled: std::result::Result<Result<Value>, oneshot::error::RecvError>,
        method: &str,
    ) -> Result<Value> {
        // The sender is dropped without settling only if the registry itself
        // was dropped mid-flight; treat it like a teardown.
        settled.unwrap_or_else(|_| {
            Err(Error::TargetClosed(format!(
                "Protocol error ({method}): Target closed"
            )))
        })
    }

    /// Fulfill a pending call. No-op if the id is unknown (already settled,
    /// timed out, or a duplicate reply).
    pub fn resolve(&self, id: RequestId, value: Value) {
        if let Some(call) = self.pending.lock().remove(&id) {
            let _ = call.tx.send(Ok(value));
        }
    }

    /// Reject a pending call with a protocol error. `original_message` keeps
    /// the untranslated wire text for log correlation. No-op if unknown.
    pub fn reject(&self, id: RequestId, message: String, original_message: Option<String>) {
        if let Some(call) = self.pending.lock().remove(&id) {
            let _ = call.tx.send(Err(Error::Protocol {
                method: call.method,
                message,
                original_message,
            }));
        }
    }

    /// Reject every pending call with a target-closed error and empty the
    /// map. Called exactly once when the owning transport/session is torn
    /// down.
    pub fn clear(&self) {
        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, call)| call).collect()
        };
        for call in drained {
            let _ = call.tx.send(Err(Error::TargetClosed(format!(
                "Protocol error ({}): Target closed",
                call.method
            ))));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Diagnostic snapshot of what is still in flight, oldest first.
    pub fn pending_protocol_errors(&self) -> Vec<Error> {
        let pending = self.pending.lock();
        let mut calls: Vec<(&RequestId, &PendingCall)> = pending.iter().collect();
        calls.sort_by_key(|(_, call)| call.created_at);
        calls
            .into_iter()
            .map(|(_, call)| Error::Timeout {
                method: call.method.clone(),
                timeout: call.created_at.elapsed(),
            })
            .collect()
    }
}
