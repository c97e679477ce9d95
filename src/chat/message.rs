//! Transcript data model: messages, their lifecycle states, and the
//! workspace snapshot updated by `workspace_update` frames.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Lifecycle of a single message.
///
/// Local sends start at `Sending` and end at `Sent` (or `Error`); streamed
/// assistant replies start at `Streaming` and end at `Sent`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Streaming,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Streaming => "streaming",
            Self::Error => "error",
        }
    }

    /// Completed content is immutable; only these states accept chunks.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// Generation metadata attached by completion frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.model_used.is_none()
            && self.total_cost.is_none()
            && self.tokens_used.is_none()
            && self.provider.is_none()
    }
}

/// One transcript entry. Ordering in the transcript is insertion order and
/// is never changed after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// Structured payload (charts, cards) carried verbatim for rendering.
    #[serde(default)]
    pub rich_content: Option<Value>,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// A locally composed user message, awaiting socket-write confirmation.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Sending,
            rich_content: None,
            metadata: None,
        }
    }

    /// An assistant message created by the first streamed chunk.
    pub fn streaming(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Streaming,
            rich_content: None,
            metadata: None,
        }
    }
}

/// Read-mostly workspace snapshot. `workspace_update` frames shallow-merge
/// into this: present fields overwrite, absent fields are preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceData {
    #[serde(default)]
    pub agent_count: Option<u32>,
    #[serde(default)]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub collaborator_count: Option<u32>,
}

impl WorkspaceData {
    pub fn merge(&mut self, update: WorkspaceData) {
        if update.agent_count.is_some() {
            self.agent_count = update.agent_count;
        }
        if update.execution_count.is_some() {
            self.execution_count = update.execution_count;
        }
        if update.collaborator_count.is_some() {
            self.collaborator_count = update.collaborator_count;
        }
    }
}
