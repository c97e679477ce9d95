//! Wire frames for the workspace chat WebSocket.
//!
//! Inbound frames are flat JSON discriminated by `type`. `complete` and
//! `stream_complete` are aliases on the wire and share one variant. Frames
//! with an unrecognized `type` are dropped with a warning — the protocol
//! grows server-first and old clients must stay connected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::message::{MessageMetadata, WorkspaceData};

// ── Inbound ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame after the handshake; carries the server's connection id.
    ConnectionEstablished {
        #[serde(default)]
        connection_id: Option<String>,
    },

    /// One streamed piece of an assistant reply.
    StreamChunk { message_id: String, content: String },

    /// Terminal frame for a message. `stream_complete` is the streaming
    /// variant of the same event and carries the same fields.
    #[serde(alias = "stream_complete")]
    Complete {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        model_used: Option<String>,
        #[serde(default)]
        total_cost: Option<f64>,
        #[serde(default)]
        tokens_used: Option<u64>,
        #[serde(default)]
        provider: Option<String>,
        /// Nested metadata object some server versions send instead of the
        /// flat fields above.
        #[serde(default)]
        metadata: Option<MessageMetadata>,
        #[serde(default)]
        rich_content: Option<Value>,
    },

    /// Shallow update to the workspace snapshot.
    WorkspaceUpdate { workspace_data: WorkspaceData },
}

impl ServerFrame {
    /// Parse one text frame. Malformed JSON and unknown `type` tags yield
    /// `None` after logging; the connection stays up either way.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => Some(frame),
            Err(parse_err) => {
                match serde_json::from_str::<Value>(text) {
                    Ok(value) => {
                        let tag = value
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("<missing>");
                        warn!("ignoring unknown or malformed frame type '{tag}': {parse_err}");
                    }
                    Err(_) => warn!("ignoring non-JSON frame: {parse_err}"),
                }
                None
            }
        }
    }
}

/// Collapse a completion frame's flat fields and nested metadata object
/// into one [`MessageMetadata`], flat fields winning.
pub fn completion_metadata(
    model_used: Option<String>,
    total_cost: Option<f64>,
    tokens_used: Option<u64>,
    provider: Option<String>,
    nested: Option<MessageMetadata>,
) -> MessageMetadata {
    let nested = nested.unwrap_or_default();
    MessageMetadata {
        model_used: model_used.or(nested.model_used),
        total_cost: total_cost.or(nested.total_cost),
        tokens_used: tokens_used.or(nested.tokens_used),
        provider: provider.or(nested.provider),
    }
}

// ── Outbound ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user message. `message_id` is client-generated so the streamed
    /// reply and local echo can be correlated.
    ChatMessage { message_id: String, content: String },
}

impl ClientFrame {
    pub fn message_id(&self) -> &str {
        match self {
            Self::ChatMessage { message_id, .. } => message_id,
        }
    }
}

// ── Close-code classification ────────────────────────────────────────

/// WebSocket policy violation close code (RFC 6455).
pub const CLOSE_POLICY: u16 = 1008;
/// Application close codes the server uses for auth failures.
pub const CLOSE_AUTH_RANGE: std::ops::RangeInclusive<u16> = 4001..=4003;

/// Whether a close code means "do not reconnect" (auth/policy failure)
/// as opposed to an ordinary drop worth retrying.
pub fn is_terminal_close(code: u16) -> bool {
    code == CLOSE_POLICY || CLOSE_AUTH_RANGE.contains(&code)
}
