//! Wire protocol shared by the bridge, the daemon, and the CLI.
//!
//! Everything that crosses the persistent plugin connection or the local
//! HTTP surface is defined here: the command envelope, the peer-side
//! message envelopes, the fixed action registry, and the uniform
//! [`CommandOutcome`] shape every caller receives. No I/O lives in this
//! crate.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod ops;

/// Protocol version stamped on every outgoing command envelope.
pub const PROTOCOL_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Action registry
// ---------------------------------------------------------------------------

/// The fixed set of actions the plugin peer understands.
///
/// An action outside this registry is rejected before transmission
/// ([`ProtocolError::UnsupportedAction`]); the peer never sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CheckAuth,
    GetRuntimeStatus,
    SearchComponent,
    ReadSchema,
    UpdateSchema,
    ListComponents,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::CheckAuth,
        Action::GetRuntimeStatus,
        Action::SearchComponent,
        Action::ReadSchema,
        Action::UpdateSchema,
        Action::ListComponents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CheckAuth => "check_auth",
            Action::GetRuntimeStatus => "get_runtime_status",
            Action::SearchComponent => "search_component",
            Action::ReadSchema => "read_schema",
            Action::UpdateSchema => "update_schema",
            Action::ListComponents => "list_components",
        }
    }

    /// Parse an action name, refusing anything outside the registry.
    pub fn parse(name: &str) -> Result<Action, ProtocolError> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| ProtocolError::UnsupportedAction {
                action: name.to_string(),
            })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    UnsupportedAction { action: String },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::UnsupportedAction { action } => {
                let allowed: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
                write!(
                    f,
                    "unsupported action '{}'. allowed: {}",
                    action,
                    allowed.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// Command envelope (caller → peer)
// ---------------------------------------------------------------------------

/// Per-command flags carried in the `meta` block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMeta {
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub continue_on_error: bool,
}

/// The command envelope forwarded to the plugin peer.
///
/// `id` is issuer-generated and globally unique for the bridge's lifetime
/// (see [`next_command_id`]); the bridge correlates the eventual reply by
/// this id alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub action: Action,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub meta: CommandMeta,
    pub protocol_version: String,
}

impl Command {
    /// Build a command with a fresh unique id.
    pub fn new(action: Action, payload: Value, meta: CommandMeta) -> Self {
        Self {
            id: next_command_id(),
            msg_type: "command".to_string(),
            action,
            payload,
            meta,
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Generate a unique command id: `cmd-<unix millis>-<counter>`.
///
/// The counter is process-wide and never resets, so ids stay unique even
/// when many commands are created within the same millisecond.
pub fn next_command_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("cmd-{}-{}", chrono::Utc::now().timestamp_millis(), n)
}

// ---------------------------------------------------------------------------
// Peer messages (peer → bridge)
// ---------------------------------------------------------------------------

/// Event name the plugin sends when it identifies itself after connect.
pub const EVENT_BRIDGE_CONNECTED: &str = "bridge_connected";

/// Everything the plugin peer may send over the WebSocket.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Correlated reply to a previously sent command.
    Result {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
    /// Unsolicited event; `bridge_connected` carries peer capabilities.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// Liveness probe (either direction).
    Ping {
        id: String,
        timestamp: f64,
    },
    /// Liveness reply. A no-op for the bridge.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
}

/// Serialized ping frame for the heartbeat loop.
pub fn ping_frame() -> String {
    let now = chrono::Utc::now();
    let msg = PeerMessage::Ping {
        id: format!("ping-{}", now.timestamp_millis()),
        timestamp: now.timestamp_millis() as f64 / 1000.0,
    };
    // PeerMessage serialization cannot fail: no non-string keys, no NaN.
    serde_json::to_string(&msg).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// CommandOutcome — uniform caller-facing result
// ---------------------------------------------------------------------------

/// The `{ok, result|error}` shape every caller receives, regardless of
/// whether the failure came from the peer, the transport, or the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl CommandOutcome {
    pub fn success(result: Option<Value>) -> Self {
        Self {
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(Value::String(error.into())),
        }
    }

    pub fn failure_value(error: Value) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error),
        }
    }

    /// Render the error as display text ("" when ok).
    pub fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandPort — the capability callers depend on
// ---------------------------------------------------------------------------

/// Anything that can issue a command and await its correlated outcome.
///
/// The in-process gateway implements this directly; the CLI implements it
/// over HTTP. The requirement compiler's resolver and the apply flow
/// depend only on this trait, never on a concrete transport.
#[async_trait::async_trait]
pub trait CommandPort: Send + Sync {
    async fn issue(&self, action: Action, payload: Value, meta: CommandMeta) -> CommandOutcome;
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_parse_accepts_registry_names() {
        for a in Action::ALL {
            assert_eq!(Action::parse(a.as_str()).unwrap(), a);
        }
    }

    #[test]
    fn action_parse_rejects_unknown_with_allowed_list() {
        let err = Action::parse("delete_everything").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unsupported action 'delete_everything'"));
        assert!(msg.contains("update_schema"));
    }

    #[test]
    fn command_envelope_shape() {
        let cmd = Command::new(
            Action::ReadSchema,
            json!({"include_wires": true}),
            CommandMeta::default(),
        );
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["type"], "command");
        assert_eq!(v["action"], "read_schema");
        assert_eq!(v["protocol_version"], PROTOCOL_VERSION);
        assert_eq!(v["meta"]["confirm"], false);
        assert!(v["id"].as_str().unwrap().starts_with("cmd-"));
    }

    #[test]
    fn command_ids_are_unique() {
        let ids: std::collections::HashSet<String> =
            (0..1000).map(|_| next_command_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn peer_message_result_round_trip() {
        let raw = r#"{"id":"cmd-1-1","type":"result","ok":true,"result":{"n":1}}"#;
        match serde_json::from_str::<PeerMessage>(raw).unwrap() {
            PeerMessage::Result { id, ok, result, .. } => {
                assert_eq!(id, "cmd-1-1");
                assert!(ok);
                assert_eq!(result.unwrap()["n"], 1);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn peer_message_bridge_connected_event() {
        let raw = r#"{"type":"event","event":"bridge_connected","payload":{"capabilities":["create_component"]}}"#;
        match serde_json::from_str::<PeerMessage>(raw).unwrap() {
            PeerMessage::Event { event, payload } => {
                assert_eq!(event, EVENT_BRIDGE_CONNECTED);
                assert_eq!(payload["capabilities"][0], "create_component");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ping_frame_is_valid_ping() {
        let frame = ping_frame();
        match serde_json::from_str::<PeerMessage>(&frame).unwrap() {
            PeerMessage::Ping { id, .. } => assert!(id.starts_with("ping-")),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn outcome_error_text_handles_string_and_object() {
        assert_eq!(CommandOutcome::failure("boom").error_text(), "boom");
        let o = CommandOutcome::failure_value(json!({"code": 7}));
        assert!(o.error_text().contains("\"code\""));
        assert_eq!(CommandOutcome::success(None).error_text(), "");
    }
}
