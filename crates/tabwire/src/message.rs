// Wire message shapes.
//
// The protocol is JSON-RPC-like: outbound commands carry `{id, method,
// params, sessionId}`, inbound traffic is either a reply (has `id`) or an
// event (has `method`). Events the core reacts to are parsed into the
// closed `CdpEvent` enum so that dispatch is an exhaustive match instead
// of string comparisons; anything else lands in `CdpEvent::Other`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::target::TargetType;

pub type RequestId = u64;
pub type SessionId = String;
pub type TargetId = String;
pub type FrameId = String;
pub type ExecutionContextId = i64;

/// Outbound command frame.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Inbound reply to a command, correlated by id.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ProtocolErrorPayload>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Error payload carried by a failed reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolErrorPayload {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ProtocolErrorPayload {
    /// The error text with any auxiliary data appended for diagnostics.
    pub fn full_message(&self) -> String {
        match &self.data {
            Some(Value::String(data)) => format!("{} {}", self.message, data),
            Some(data) => format!("{} {}", self.message, data),
            None => self.message.clone(),
        }
    }
}

/// Inbound event frame.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Discriminated union of inbound messages. Replies carry an `id`; events
/// do not, so `untagged` deserialization tries `Reply` first.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Reply(Reply),
    Event(EventMessage),
}

/// Description of a debuggable target, as reported by the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub kind: TargetType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
    #[serde(default)]
    pub opener_id: Option<TargetId>,
    #[serde(default)]
    pub browser_context_id: Option<String>,
    /// Page subtype ("prerender" and friends). A page target with a subtype
    /// is not yet the primary page of its tab.
    #[serde(default)]
    pub subtype: Option<String>,
}

/// Frame description carried by navigation events and tree snapshots.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    pub id: FrameId,
    #[serde(default)]
    pub parent_id: Option<FrameId>,
    #[serde(default)]
    pub loader_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_fragment: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Recursive frame-tree snapshot returned by the tree dump command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTreeSnapshot {
    pub frame: FramePayload,
    #[serde(default)]
    pub child_frames: Option<Vec<FrameTreeSnapshot>>,
}

/// Why a frame was detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetachReason {
    /// The frame is gone for good, along with its subtree.
    Remove,
    /// The frame moved to another process; a matching attach follows under
    /// a different session. The node must survive.
    Swap,
    /// Unrecognized reason from a newer protocol revision; handled as a
    /// defensive no-op.
    #[serde(other)]
    Other,
}

/// Kind of committed navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum NavigationType {
    #[default]
    Navigation,
    BackForwardCacheRestore,
    #[serde(other)]
    Other,
}

/// Execution-context description from context-created events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDescription {
    pub id: ExecutionContextId,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub aux_data: Option<ContextAuxData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAuxData {
    #[serde(default)]
    pub frame_id: Option<FrameId>,
    #[serde(default)]
    pub is_default: bool,
}

/// Protocol events consumed by the core, keyed by method name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum CdpEvent {
    #[serde(rename = "Target.targetCreated", rename_all = "camelCase")]
    TargetCreated { target_info: TargetInfo },

    #[serde(rename = "Target.targetDestroyed", rename_all = "camelCase")]
    TargetDestroyed { target_id: TargetId },

    #[serde(rename = "Target.targetInfoChanged", rename_all = "camelCase")]
    TargetInfoChanged { target_info: TargetInfo },

    #[serde(rename = "Target.attachedToTarget", rename_all = "camelCase")]
    AttachedToTarget {
        session_id: SessionId,
        target_info: TargetInfo,
        #[serde(default)]
        waiting_for_debugger: bool,
    },

    #[serde(rename = "Target.detachedFromTarget", rename_all = "camelCase")]
    DetachedFromTarget { session_id: SessionId },

    #[serde(rename = "Page.frameAttached", rename_all = "camelCase")]
    FrameAttached {
        frame_id: FrameId,
        parent_frame_id: FrameId,
    },

    #[serde(rename = "Page.frameNavigated", rename_all = "camelCase")]
    FrameNavigated {
        frame: FramePayload,
        #[serde(rename = "type", default)]
        navigation_type: NavigationType,
    },

    #[serde(rename = "Page.navigatedWithinDocument", rename_all = "camelCase")]
    NavigatedWithinDocument { frame_id: FrameId, url: String },

    #[serde(rename = "Page.frameDetached", rename_all = "camelCase")]
    FrameDetached {
        frame_id: FrameId,
        #[serde(default = "default_detach_reason")]
        reason: DetachReason,
    },

    #[serde(rename = "Page.frameStartedLoading", rename_all = "camelCase")]
    FrameStartedLoading { frame_id: FrameId },

    #[serde(rename = "Page.frameStoppedLoading", rename_all = "camelCase")]
    FrameStoppedLoading { frame_id: FrameId },

    #[serde(rename = "Page.lifecycleEvent", rename_all = "camelCase")]
    LifecycleEvent {
        frame_id: FrameId,
        loader_id: String,
        name: String,
    },

    #[serde(rename = "Runtime.executionContextCreated", rename_all = "camelCase")]
    ExecutionContextCreated { context: ContextDescription },

    #[serde(
        rename = "Runtime.executionContextDestroyed",
        rename_all = "camelCase"
    )]
    ExecutionContextDestroyed {
        execution_context_id: ExecutionContextId,
    },

    #[serde(rename = "Runtime.executionContextsCleared")]
    ExecutionContextsCleared {},

    /// Any event the core does not model. Surfaced to subscribers rather
    /// than dropped.
    #[serde(skip)]
    Other { method: String, params: Value },
}

fn default_detach_reason() -> DetachReason {
    DetachReason::Remove
}

impl CdpEvent {
    /// Parse a wire event. Unknown methods, and known methods whose payload
    /// does not match the expected shape, become `Other` — the event stream
    /// is not under this layer's control and must not bring it down.
    pub fn parse(method: &str, params: Value) -> CdpEvent {
        // Events without params arrive as null; normalize so payload-free
        // variants still match.
        let params = if params.is_null() {
            serde_json::json!({})
        } else {
            params
        };
        let envelope = serde_json::json!({ "method": method, "params": params });
        match serde_json::from_value::<CdpEvent>(envelope) {
            Ok(event) => event,
            Err(_) => CdpEvent::Other {
                method: method.to_string(),
                params,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_and_event_are_distinguished_by_id() {
        let reply: Message =
            serde_json::from_str(r#"{"id": 7, "result": {"ok": true}}"#).unwrap();
        assert!(matches!(reply, Message::Reply(r) if r.id == 7));

        let event: Message = serde_json::from_str(
            r#"{"method": "Page.frameStartedLoading", "params": {"frameId": "F1"}, "sessionId": "S1"}"#,
        )
        .unwrap();
        match event {
            Message::Event(e) => {
                assert_eq!(e.method, "Page.frameStartedLoading");
                assert_eq!(e.session_id.as_deref(), Some("S1"));
            }
            _ => panic!("expected event"),
        }
    }

    #[test]
    fn known_events_parse_into_variants() {
        let event = CdpEvent::parse(
            "Page.frameDetached",
            serde_json::json!({"frameId": "F1", "reason": "swap"}),
        );
        assert!(matches!(
            event,
            CdpEvent::FrameDetached { frame_id, reason: DetachReason::Swap } if frame_id == "F1"
        ));

        let event = CdpEvent::parse(
            "Target.attachedToTarget",
            serde_json::json!({
                "sessionId": "S1",
                "targetInfo": {"targetId": "T1", "type": "page", "url": "about:blank"},
                "waitingForDebugger": true,
            }),
        );
        match event {
            CdpEvent::AttachedToTarget {
                session_id,
                target_info,
                waiting_for_debugger,
            } => {
                assert_eq!(session_id, "S1");
                assert_eq!(target_info.kind, TargetType::Page);
                assert!(waiting_for_debugger);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn unknown_and_malformed_events_fall_back_to_other() {
        let event = CdpEvent::parse("Network.requestWillBeSent", serde_json::json!({"x": 1}));
        assert!(matches!(event, CdpEvent::Other { method, .. } if method == "Network.requestWillBeSent"));

        // Known method, wrong payload shape: defensive fallback, not a crash.
        let event = CdpEvent::parse("Page.frameAttached", serde_json::json!({"frameId": 42}));
        assert!(matches!(event, CdpEvent::Other { .. }));
    }

    #[test]
    fn unknown_detach_reason_is_tolerated() {
        let event = CdpEvent::parse(
            "Page.frameDetached",
            serde_json::json!({"frameId": "F1", "reason": "teleport"}),
        );
        assert!(matches!(
            event,
            CdpEvent::FrameDetached { reason: DetachReason::Other, .. }
        ));
    }

    #[test]
    fn command_serialization_omits_absent_fields() {
        let command = Command {
            id: 3,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };
        let text = serde_json::to_string(&command).unwrap();
        assert_eq!(text, r#"{"id":3,"method":"Page.enable"}"#);

        let command = Command {
            id: 4,
            method: "Page.navigate".to_string(),
            params: Some(serde_json::json!({"url": "https://example.com"})),
            session_id: Some("S1".to_string()),
        };
        let value: Value = serde_json::from_str(&serde_json::to_string(&command).unwrap()).unwrap();
        assert_eq!(value["sessionId"], "S1");
        assert_eq!(value["params"]["url"], "https://example.com");
    }
}
