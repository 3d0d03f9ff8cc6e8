// Connection: the single point of contact with the transport.
//
// Demultiplexes the inbound stream three ways: command replies are matched
// against the pending registry (the connection's own, or a session's),
// attach/detach control notifications create and destroy sessions, and
// everything else is emitted as an event. All outbound traffic — root or
// session-tagged — goes through one write path and one encoding rule.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;

use crate::callbacks::CallbackRegistry;
use crate::error::{Error, Result};
use crate::events::EventEmitter;
use crate::message::{CdpEvent, Command, Message, Reply, SessionId, TargetId};
use crate::session::{Session, SessionEvent};
use crate::transport::Transport;

/// Default deadline for a command reply.
pub const DEFAULT_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(180);

/// Events emitted by the connection.
#[derive(Clone)]
pub enum ConnectionEvent {
    /// The browser reported a new attachment; a session now exists for it.
    SessionAttached(Arc<Session>),
    /// The browser reported a detachment; the session has been torn down.
    SessionDetached(Arc<Session>),
    /// A root-attached target finished its attach handshake.
    Ready(Arc<Session>),
    /// The transport closed; every pending call has failed.
    Disconnected,
    /// A protocol event not addressed to any session.
    Event(Arc<CdpEvent>),
}

/// Handle to a live browser connection. Cheap to clone; the last clone
/// dropping does not close the transport — call `dispose` for that.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    transport: TokioMutex<Box<dyn Transport>>,
    callbacks: CallbackRegistry,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    manually_attached: Mutex<HashSet<TargetId>>,
    closed: AtomicBool,
    protocol_timeout: Duration,
    emitter: EventEmitter<ConnectionEvent>,
}

impl Connection {
    /// Take ownership of a transport and start dispatching its messages.
    ///
    /// `incoming` is the inbound frame stream; when it ends (transport
    /// closed), every pending call fails and `Disconnected` is emitted.
    pub fn connect(
        transport: impl Transport + 'static,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Connection {
        Self::connect_with_timeout(transport, incoming, DEFAULT_PROTOCOL_TIMEOUT)
    }

    pub fn connect_with_timeout(
        transport: impl Transport + 'static,
        mut incoming: mpsc::UnboundedReceiver<String>,
        protocol_timeout: Duration,
    ) -> Connection {
        let inner = Arc::new(ConnectionInner {
            transport: TokioMutex::new(Box::new(transport)),
            callbacks: CallbackRegistry::new(),
            sessions: Mutex::new(HashMap::new()),
            manually_attached: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            protocol_timeout,
            emitter: EventEmitter::new(),
        });

        let dispatch = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(raw) = incoming.recv().await {
                dispatch.on_message(&raw);
            }
            dispatch.on_close();
        });

        Connection { inner }
    }

    pub fn protocol_timeout(&self) -> Duration {
        self.inner.protocol_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The session registered under `session_id`, if it is still live.
    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner.session(session_id)
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.sessions.lock().values().cloned().collect()
    }

    /// Subscribe to connection-level events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.inner.emitter.subscribe()
    }

    pub(crate) fn emitter(&self) -> &EventEmitter<ConnectionEvent> {
        &self.inner.emitter
    }

    pub(crate) fn inner(&self) -> &Arc<ConnectionInner> {
        &self.inner
    }

    /// Send a command on the root channel (no session id) and await its
    /// reply.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.send_with_timeout(method, params, None).await
    }

    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let timeout = timeout.unwrap_or(self.inner.protocol_timeout);
        self.inner
            .raw_send(&self.inner.callbacks, method, params, None, Some(timeout))
            .await
    }

    /// True unless an explicit `create_session` for this target is in
    /// flight. The target manager uses this to leave manual attachments
    /// alone.
    pub fn is_auto_attached(&self, target_id: &str) -> bool {
        !self.inner.manually_attached.lock().contains(target_id)
    }

    /// Attach to a target explicitly and return its session.
    pub async fn create_session(&self, target_id: &str) -> Result<Arc<Session>> {
        self.create_session_internal(target_id, false).await
    }

    pub(crate) async fn create_session_internal(
        &self,
        target_id: &str,
        is_auto_attach_emulated: bool,
    ) -> Result<Arc<Session>> {
        if !is_auto_attach_emulated {
            self.inner
                .manually_attached
                .lock()
                .insert(target_id.to_string());
        }
        let result = self
            .send(
                "Target.attachToTarget",
                Some(serde_json::json!({ "targetId": target_id, "flatten": true })),
            )
            .await;
        self.inner.manually_attached.lock().remove(target_id);
        let result = result?;

        let session_id = result["sessionId"].as_str().ok_or_else(|| Error::Protocol {
            method: "Target.attachToTarget".to_string(),
            message: "attach reply carried no sessionId".to_string(),
            original_message: None,
        })?;
        // The attach notification precedes the reply on the same stream, so
        // the session must already be registered.
        self.session(session_id).ok_or_else(|| Error::Protocol {
            method: "Target.attachToTarget".to_string(),
            message: format!("session {session_id} was not created"),
            original_message: None,
        })
    }

    /// Diagnostic snapshot of everything still in flight, across the root
    /// registry and every session.
    pub fn pending_protocol_errors(&self) -> Vec<Error> {
        let mut errors = self.inner.callbacks.pending_protocol_errors();
        for session in self.sessions() {
            errors.extend(session.pending_protocol_errors());
        }
        errors
    }

    /// Close the transport and tear everything down. Safe to call more
    /// than once.
    pub async fn dispose(&self) {
        self.inner.on_close();
        self.inner.transport.lock().await.close().await;
    }
}

impl ConnectionInner {
    pub(crate) fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Shared outbound path for the root channel and every session: one
    /// write lock, one encoding rule. Messages carry at most
    /// `{id, method, params, sessionId}`, with `sessionId` omitted for the
    /// root.
    pub(crate) async fn raw_send(
        self: &Arc<Self>,
        callbacks: &CallbackRegistry,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        let session_id = session_id.map(str::to_string);
        callbacks
            .create(method, timeout, |id| {
                let command = Command {
                    id,
                    method: method.to_string(),
                    params,
                    session_id,
                };
                async move {
                    let text = serde_json::to_string(&command).map_err(Error::json)?;
                    tracing::debug!(target: "tabwire::protocol", "SEND ► {text}");
                    self.transport.lock().await.send(text).await
                }
            })
            .await
    }

    /// Root-channel send for internal callers holding only the inner arc.
    pub(crate) async fn root_send(
        self: &Arc<Self>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value> {
        let timeout = self.protocol_timeout;
        self.raw_send(&self.callbacks, method, params, None, Some(timeout))
            .await
    }

    fn on_message(self: &Arc<Self>, raw: &str) {
        tracing::debug!(target: "tabwire::protocol", "RECV ◀ {raw}");
        let message: Message = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!("Failed to parse message: {err}");
                return;
            }
        };
        match message {
            Message::Reply(reply) => self.route_reply(reply),
            Message::Event(event) => self.route_event(event),
        }
    }

    fn route_reply(&self, reply: Reply) {
        match &reply.session_id {
            Some(session_id) => match self.session(session_id) {
                Some(session) => session.on_reply(reply),
                None => {
                    tracing::warn!("Reply for unknown session {session_id}: id={}", reply.id);
                }
            },
            None => {
                if let Some(error) = reply.error {
                    self.callbacks.reject(
                        reply.id,
                        error.full_message(),
                        Some(error.message.clone()),
                    );
                } else {
                    self.callbacks
                        .resolve(reply.id, reply.result.unwrap_or(Value::Null));
                }
            }
        }
    }

    fn route_event(self: &Arc<Self>, message: crate::message::EventMessage) {
        let event = Arc::new(CdpEvent::parse(&message.method, message.params));

        // Attach/detach control notifications mutate the session registry
        // before anything else sees the event.
        match &*event {
            CdpEvent::AttachedToTarget {
                session_id,
                target_info,
                ..
            } => {
                let session = Session::new(
                    Arc::downgrade(self),
                    target_info.kind,
                    session_id.clone(),
                    message.session_id.clone(),
                    self.protocol_timeout,
                );
                self.sessions
                    .lock()
                    .insert(session_id.clone(), Arc::clone(&session));
                self.emitter
                    .emit(ConnectionEvent::SessionAttached(Arc::clone(&session)));
                if let Some(parent) = message.session_id.as_deref().and_then(|id| self.session(id))
                {
                    parent.emitter().emit(SessionEvent::Attached(session));
                }
            }
            CdpEvent::DetachedFromTarget { session_id } => {
                let session = self.sessions.lock().remove(session_id);
                if let Some(session) = session {
                    session.on_closed();
                    self.emitter
                        .emit(ConnectionEvent::SessionDetached(Arc::clone(&session)));
                    if let Some(parent) =
                        message.session_id.as_deref().and_then(|id| self.session(id))
                    {
                        parent.emitter().emit(SessionEvent::Detached(session));
                    }
                }
            }
            _ => {}
        }

        // Then route: session-addressed events go only to that session,
        // everything else is a connection-level event.
        match &message.session_id {
            Some(session_id) => {
                if let Some(session) = self.session(session_id) {
                    session.on_event(event);
                } else {
                    tracing::warn!(
                        "Event {} for unknown session {session_id}",
                        event_method(&event)
                    );
                }
            }
            None => {
                self.emitter.emit(ConnectionEvent::Event(event));
            }
        }
    }

    /// Transport gone or `dispose` called: fail all pending calls, close
    /// every session, notify listeners. Flag-guarded; runs once.
    pub(crate) fn on_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.callbacks.clear();
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.lock();
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.on_closed();
        }
        self.emitter.emit(ConnectionEvent::Disconnected);
    }

    pub(crate) fn emit_ready(&self, session: Arc<Session>) {
        self.emitter.emit(ConnectionEvent::Ready(session));
    }
}

fn event_method(event: &CdpEvent) -> &str {
    match event {
        CdpEvent::Other { method, .. } => method,
        CdpEvent::TargetCreated { .. } => "Target.targetCreated",
        CdpEvent::TargetDestroyed { .. } => "Target.targetDestroyed",
        CdpEvent::TargetInfoChanged { .. } => "Target.targetInfoChanged",
        CdpEvent::AttachedToTarget { .. } => "Target.attachedToTarget",
        CdpEvent::DetachedFromTarget { .. } => "Target.detachedFromTarget",
        CdpEvent::FrameAttached { .. } => "Page.frameAttached",
        CdpEvent::FrameNavigated { .. } => "Page.frameNavigated",
        CdpEvent::NavigatedWithinDocument { .. } => "Page.navigatedWithinDocument",
        CdpEvent::FrameDetached { .. } => "Page.frameDetached",
        CdpEvent::FrameStartedLoading { .. } => "Page.frameStartedLoading",
        CdpEvent::FrameStoppedLoading { .. } => "Page.frameStoppedLoading",
        CdpEvent::LifecycleEvent { .. } => "Page.lifecycleEvent",
        CdpEvent::ExecutionContextCreated { .. } => "Runtime.executionContextCreated",
        CdpEvent::ExecutionContextDestroyed { .. } => "Runtime.executionContextDestroyed",
        CdpEvent::ExecutionContextsCleared {} => "Runtime.executionContextsCleared",
    }
}
