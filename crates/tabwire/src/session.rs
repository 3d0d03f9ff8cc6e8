// Session: one logical sub-channel of the shared transport, scoped to a
// single attached target. Behaves like a connection for `send`, but every
// command is tagged with the session id and funneled through the owning
// connection's write path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::callbacks::CallbackRegistry;
use crate::connection::ConnectionInner;
use crate::error::{Error, Result};
use crate::events::EventEmitter;
use crate::message::{CdpEvent, Reply, SessionId};
use crate::target::{Target, TargetType};

/// Events emitted by a session.
#[derive(Clone)]
pub enum SessionEvent {
    /// A child session attached under this one.
    Attached(Arc<Session>),
    /// A child session detached.
    Detached(Arc<Session>),
    /// A child target finished its attach handshake and is ready for use.
    Ready(Arc<Session>),
    /// This session's target was superseded by another session (prerender
    /// activation); listeners should rebind before the target is reused.
    Swapped(Arc<Session>),
    /// The session itself was torn down; all pending calls have failed.
    Disconnected,
    /// A protocol event addressed to this session.
    Event(Arc<CdpEvent>),
}

pub struct Session {
    session_id: SessionId,
    target_type: TargetType,
    parent_session_id: Option<SessionId>,
    connection: Weak<ConnectionInner>,
    callbacks: CallbackRegistry,
    emitter: EventEmitter<SessionEvent>,
    closed: AtomicBool,
    target: parking_lot::Mutex<Option<Weak<Target>>>,
    protocol_timeout: Duration,
}

impl Session {
    pub(crate) fn new(
        connection: Weak<ConnectionInner>,
        target_type: TargetType,
        session_id: SessionId,
        parent_session_id: Option<SessionId>,
        protocol_timeout: Duration,
    ) -> Arc<Session> {
        Arc::new(Session {
            session_id,
            target_type,
            parent_session_id,
            connection,
            callbacks: CallbackRegistry::new(),
            emitter: EventEmitter::new(),
            closed: AtomicBool::new(false),
            target: parking_lot::Mutex::new(None),
            protocol_timeout,
        })
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    pub fn parent_session_id(&self) -> Option<&str> {
        self.parent_session_id.as_deref()
    }

    /// The parent session, when it is still alive and registered.
    pub fn parent_session(&self) -> Option<Arc<Session>> {
        let connection = self.connection.upgrade()?;
        let parent_id = self.parent_session_id.as_deref()?;
        connection.session(parent_id)
    }

    /// The target this session is attached to, once the target manager has
    /// linked it.
    pub fn target(&self) -> Option<Arc<Target>> {
        self.target.lock().as_ref()?.upgrade()
    }

    pub(crate) fn set_target(&self, target: Weak<Target>) {
        *self.target.lock() = Some(target);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to this session's event stream.
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<SessionEvent> {
        self.emitter.subscribe()
    }

    pub(crate) fn emitter(&self) -> &EventEmitter<SessionEvent> {
        &self.emitter
    }

    /// Send a command on this session and await its reply.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.send_with_timeout(method, params, None).await
    }

    /// Like `send`, with a per-call timeout overriding the connection-wide
    /// `protocol_timeout`.
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::SessionClosed {
                session_id: self.session_id.clone(),
                target_type: self.target_type.as_str().to_string(),
            });
        }
        let Some(connection) = self.connection.upgrade() else {
            return Err(Error::ConnectionClosed);
        };
        let timeout = timeout.unwrap_or(self.protocol_timeout);
        connection
            .raw_send(
                &self.callbacks,
                method,
                params,
                Some(&self.session_id),
                Some(timeout),
            )
            .await
    }

    /// Detach this session from its target.
    ///
    /// The detach command goes to the parent session (or the root
    /// connection) rather than through this session, which is about to die.
    pub async fn detach(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed {
                session_id: self.session_id.clone(),
                target_type: self.target_type.as_str().to_string(),
            });
        }
        let params = serde_json::json!({ "sessionId": self.session_id });
        if let Some(parent) = self.parent_session() {
            parent.send("Target.detachFromTarget", Some(params)).await?;
            return Ok(());
        }
        let Some(connection) = self.connection.upgrade() else {
            return Err(Error::ConnectionClosed);
        };
        connection
            .root_send("Target.detachFromTarget", Some(params))
            .await?;
        Ok(())
    }

    /// Route a reply addressed to this session.
    pub(crate) fn on_reply(&self, reply: Reply) {
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

    /// Route an event addressed to this session.
    pub(crate) fn on_event(&self, event: Arc<CdpEvent>) {
        self.emitter.emit(SessionEvent::Event(event));
    }

    /// Tear down: fail every pending call and emit `Disconnected`.
    /// Idempotent; the session is permanently unusable afterwards.
    pub(crate) fn on_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.callbacks.clear();
        self.emitter.emit(SessionEvent::Disconnected);
    }

    pub(crate) fn pending_protocol_errors(&self) -> Vec<Error> {
        self.callbacks.pending_protocol_errors()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("target_type", &self.target_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}
