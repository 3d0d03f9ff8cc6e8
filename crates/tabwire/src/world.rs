// Isolated worlds: the JavaScript realms bound to a frame.
//
// Every frame carries two worlds — the page's own main world and a
// privileged utility world the controller injects for instrumentation
// without touching page globals. A world's live execution context comes
// and goes with navigations; evaluation always targets the currently-live
// context and fails (never hangs) when that context is torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::message::ExecutionContextId;
use crate::session::Session;

/// Name under which the utility world is created in the browser.
pub const UTILITY_WORLD_NAME: &str = "__tabwire_utility_world__";

/// Source URL tag for internal bootstrap scripts.
pub(crate) const INTERNAL_URL: &str = "tabwire:internal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldKind {
    Main,
    Utility,
}

/// A live JavaScript realm: its protocol id plus the session it lives on.
#[derive(Clone)]
pub struct ExecutionContext {
    pub id: ExecutionContextId,
    pub(crate) session: Weak<Session>,
}

impl ExecutionContext {
    pub(crate) fn new(id: ExecutionContextId, session: &Arc<Session>) -> Self {
        Self {
            id,
            session: Arc::downgrade(session),
        }
    }
}

pub struct IsolatedWorld {
    frame: Weak<Frame>,
    kind: WorldKind,
    /// Latch for the currently-live context. Replaced whenever the context
    /// is cleared, so callers arriving after a navigation wait for the next
    /// context instead of failing on the old one.
    context: Mutex<Deferred<ExecutionContext>>,
    disposed: AtomicBool,
}

impl IsolatedWorld {
    pub(crate) fn new(frame: Weak<Frame>, kind: WorldKind) -> Self {
        Self {
            frame,
            kind,
            context: Mutex::new(Deferred::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> WorldKind {
        self.kind
    }

    pub fn has_context(&self) -> bool {
        matches!(self.context.lock().value(), Some(Ok(_)))
    }

    /// The live context id, if one is bound.
    pub fn context_id(&self) -> Option<ExecutionContextId> {
        match self.context.lock().value() {
            Some(Ok(context)) => Some(context.id),
            _ => None,
        }
    }

    /// Bind a newly created context, replacing any previous binding.
    pub(crate) fn set_context(&self, context: ExecutionContext) {
        let mut slot = self.context.lock();
        if slot.is_settled() {
            *slot = Deferred::new();
        }
        slot.resolve(context);
    }

    /// Drop the live binding. Waiters pending on the old context fail with
    /// a context-destroyed error; later callers wait for the next context.
    pub(crate) fn clear_context(&self) {
        let mut slot = self.context.lock();
        slot.reject(Error::ContextDestroyed);
        *slot = Deferred::new();
    }

    /// Clear only if the live binding is `context_id`. Guards against a
    /// stale destroy notification racing a newer binding.
    pub(crate) fn clear_context_if(&self, context_id: ExecutionContextId) {
        let matches = {
            let slot = self.context.lock();
            matches!(slot.value(), Some(Ok(context)) if context.id == context_id)
        };
        if matches {
            self.clear_context();
        }
    }

    /// Permanently fail the world; used when its frame is detached.
    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let slot = self.context.lock();
        slot.reject(Error::ContextNotFound(self.frame_url()));
    }

    fn frame_url(&self) -> String {
        self.frame
            .upgrade()
            .map(|frame| frame.url())
            .unwrap_or_default()
    }

    async fn context(&self) -> Result<ExecutionContext> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::ContextNotFound(self.frame_url()));
        }
        let waiter = self.context.lock().clone();
        waiter.wait().await
    }

    /// Evaluate an expression in this world's live context.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let context = self.context().await?;
        let session = context
            .session
            .upgrade()
            .ok_or(Error::ConnectionClosed)?;
        let result = session
            .send(
                "Runtime.evaluate",
                Some(serde_json::json!({
                    "expression": expression,
                    "contextId": context.id,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await
            .map_err(rewrite_context_error)?;
        unwrap_remote_result(result)
    }

    /// Call a function declaration with `returnByValue` arguments in this
    /// world's live context.
    pub async fn call_function(&self, declaration: &str, args: Vec<Value>) -> Result<Value> {
        let context = self.context().await?;
        let session = context
            .session
            .upgrade()
            .ok_or(Error::ConnectionClosed)?;
        let arguments: Vec<Value> = args
            .into_iter()
            .map(|value| serde_json::json!({ "value": value }))
            .collect();
        let result = session
            .send(
                "Runtime.callFunctionOn",
                Some(serde_json::json!({
                    "functionDeclaration": declaration,
                    "arguments": arguments,
                    "executionContextId": context.id,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await
            .map_err(rewrite_context_error)?;
        unwrap_remote_result(result)
    }
}

/// The browser reports a torn-down realm as a generic protocol error; give
/// callers the typed variant instead so they can tell a navigation race
/// from a real failure.
fn rewrite_context_error(err: Error) -> Error {
    if let Error::Protocol { message, .. } = &err {
        if message.contains("Cannot find context with specified id")
            || message.contains("Execution context was destroyed")
        {
            return Error::ContextDestroyed;
        }
    }
    err
}

fn unwrap_remote_result(mut result: Value) -> Result<Value> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .get("exception")
            .and_then(|e| e.get("description"))
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("Evaluation failed");
        return Err(Error::Protocol {
            method: "Runtime.evaluate".to_string(),
            message: text.to_string(),
            original_message: None,
        });
    }
    Ok(result
        .get_mut("result")
        .map(|r| r.get_mut("value").map(Value::take).unwrap_or(Value::Null))
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_errors_are_rewritten() {
        let err = rewrite_context_error(Error::Protocol {
            method: "Runtime.evaluate".to_string(),
            message: "Cannot find context with specified id".to_string(),
            original_message: None,
        });
        assert!(matches!(err, Error::ContextDestroyed));

        let err = rewrite_context_error(Error::ConnectionClosed);
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn exception_details_surface_as_errors() {
        let result = serde_json::json!({
            "result": {"type": "object"},
            "exceptionDetails": {"text": "Uncaught", "exception": {"description": "ReferenceError: x is not defined"}},
        });
        let err = unwrap_remote_result(result).unwrap_err();
        assert!(err.to_string().contains("ReferenceError"));

        let result = serde_json::json!({"result": {"type": "number", "value": 3}});
        assert_eq!(unwrap_remote_result(result).unwrap(), 3);
    }
}
