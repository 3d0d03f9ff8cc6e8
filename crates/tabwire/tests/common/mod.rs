// Shared test harness: a recording transport plus a scriptable responder,
// so tests can drive the full connection stack without a browser.

// Not every test crate uses every helper.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use tabwire::{Connection, Error, Transport};

/// Transport that records every outbound command as parsed JSON.
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Value>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&mut self, text: String) -> tabwire::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("transport closed".to_string()));
        }
        let value: Value =
            serde_json::from_str(&text).map_err(|e| Error::Transport(e.to_string()))?;
        self.sent.lock().push(value);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub connection: Connection,
    sent: Arc<Mutex<Vec<Value>>>,
    incoming: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rules: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Harness {
    pub fn new() -> Arc<Harness> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = RecordingTransport {
            sent: Arc::clone(&sent),
            closed,
        };
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let connection = Connection::connect(transport, incoming_rx);

        let harness = Arc::new(Harness {
            connection,
            sent,
            incoming: Mutex::new(Some(incoming_tx)),
            rules: Arc::new(Mutex::new(Vec::new())),
        });

        // Auto-responder: replies to recorded commands that match a rule,
        // echoing the command's sessionId so the reply routes back to the
        // right registry.
        let responder = Arc::clone(&harness);
        tokio::spawn(async move {
            let mut handled: HashSet<(u64, Option<String>)> = HashSet::new();
            loop {
                let pending: Vec<Value> = responder.sent.lock().clone();
                for command in pending {
                    let id = command["id"].as_u64().unwrap_or(0);
                    let session_id = command["sessionId"].as_str().map(str::to_string);
                    if handled.contains(&(id, session_id.clone())) {
                        continue;
                    }
                    let method = command["method"].as_str().unwrap_or("");
                    let result = responder
                        .rules
                        .lock()
                        .iter()
                        .find(|(m, _)| m == method)
                        .map(|(_, r)| r.clone());
                    if let Some(result) = result {
                        handled.insert((id, session_id.clone()));
                        let mut reply = json!({ "id": id, "result": result });
                        if let Some(session_id) = session_id {
                            reply["sessionId"] = json!(session_id);
                        }
                        if !responder.deliver(reply) {
                            return;
                        }
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        harness
    }

    /// Auto-reply to every future command with `method`.
    pub fn respond(&self, method: &str, result: Value) {
        self.rules.lock().push((method.to_string(), result));
    }

    /// Standard reply set for the frame-manager handshake.
    pub fn respond_page_handshake(&self, main_frame_id: &str, url: &str) {
        self.respond("Network.enable", json!({}));
        self.respond("Page.enable", json!({}));
        self.respond(
            "Page.getFrameTree",
            json!({
                "frameTree": {
                    "frame": {"id": main_frame_id, "loaderId": "L1", "url": url},
                    "childFrames": [],
                }
            }),
        );
        self.respond("Page.setLifecycleEventsEnabled", json!({}));
        self.respond("Runtime.enable", json!({}));
        self.respond("Page.addScriptToEvaluateOnNewDocument", json!({"identifier": "1"}));
        self.respond("Page.createIsolatedWorld", json!({"executionContextId": 9}));
        self.respond("Target.setAutoAttach", json!({}));
        self.respond("Runtime.runIfWaitingForDebugger", json!({}));
    }

    /// Inject an inbound message. Returns false once the transport is gone.
    pub fn deliver(&self, message: Value) -> bool {
        let incoming = self.incoming.lock();
        match incoming.as_ref() {
            Some(tx) => tx.send(message.to_string()).is_ok(),
            None => false,
        }
    }

    /// Simulate the browser announcing an attached session.
    pub fn deliver_attached(
        &self,
        session_id: &str,
        target_id: &str,
        target_type: &str,
        url: &str,
        parent_session_id: Option<&str>,
    ) {
        let mut message = json!({
            "method": "Target.attachedToTarget",
            "params": {
                "sessionId": session_id,
                "targetInfo": {
                    "targetId": target_id,
                    "type": target_type,
                    "url": url,
                    "title": "",
                    "attached": true,
                },
                "waitingForDebugger": false,
            },
        });
        if let Some(parent) = parent_session_id {
            message["sessionId"] = json!(parent);
        }
        self.deliver(message);
    }

    /// Deliver an event addressed to a session.
    pub fn deliver_session_event(&self, session_id: &str, method: &str, params: Value) {
        self.deliver(json!({
            "method": method,
            "params": params,
            "sessionId": session_id,
        }));
    }

    /// Close the inbound stream, as if the browser hung up.
    pub fn close_transport(&self) {
        self.incoming.lock().take();
    }

    pub fn sent_commands(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    /// All recorded commands with the given method.
    pub fn commands_named(&self, method: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|c| c["method"] == method)
            .cloned()
            .collect()
    }

    /// Wait until a command with `method` has been sent, and return it.
    pub async fn wait_for_command(&self, method: &str) -> Value {
        let found = until(|| self.commands_named(method).into_iter().next()).await;
        found.unwrap_or_else(|| panic!("command {method} was never sent"))
    }
}

/// Poll until `probe` yields a value, for up to two seconds.
pub async fn until<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    for _ in 0..2000 {
        if let Some(value) = probe() {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    None
}

/// Give in-flight dispatch a moment to settle.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
}
