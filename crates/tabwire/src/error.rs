// Error types for tabwire

use std::time::Duration;

use thiserror::Error;

/// Result type alias for tabwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when driving a browser over the wire protocol.
///
/// The type is `Clone` so that a single failure (a closed transport, a
/// destroyed execution context) can be fanned out to every waiter that was
/// pending on it. I/O and JSON failures are mapped into string-carrying
/// variants at the boundary where they occur.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The connection to the browser was closed before or during the call
    #[error("Connection closed. Most likely the browser process was closed")]
    ConnectionClosed,

    /// The session was detached; no further commands can be sent through it
    #[error("Session closed. Most likely the {target_type} has been closed (session {session_id})")]
    SessionClosed {
        session_id: String,
        target_type: String,
    },

    /// The target (browser, page, or worker) went away while a call was pending
    #[error("{0}")]
    TargetClosed(String),

    /// Transport-level error (framing, broken pipe)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The browser replied with an error payload
    #[error("Protocol error ({method}): {message}")]
    Protocol {
        /// Method name of the command that failed
        method: String,
        /// Error text with any auxiliary data appended
        message: String,
        /// Untranslated error message from the wire, kept for log correlation
        original_message: Option<String>,
    },

    /// No reply arrived within the configured deadline
    #[error(
        "{method} timed out after {timeout:?}. Increase the 'protocol_timeout' \
         connection setting if the target is expected to be slow"
    )]
    Timeout { method: String, timeout: Duration },

    /// An operation addressed a frame id that is not in the tree
    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    /// The JavaScript realm backing an evaluation was torn down
    #[error("Execution context was destroyed, most likely because of a navigation")]
    ContextDestroyed,

    /// Evaluation was attempted against a frame that has been detached
    #[error("Execution context is not available in detached frame \"{0}\" (are you trying to evaluate?)")]
    ContextNotFound(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(String),
}

impl Error {
    /// True for errors that mean "the other end is gone", as opposed to a
    /// failure of one particular command. Callers use this to tell apart
    /// teardown races from real protocol failures.
    pub fn is_target_closed(&self) -> bool {
        matches!(
            self,
            Error::TargetClosed(_) | Error::ConnectionClosed | Error::SessionClosed { .. }
        )
    }

    pub(crate) fn json(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}
