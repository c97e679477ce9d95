//! One user-facing chat session: a pooled connection plus the transcript
//! it feeds. The session owns the event loop glue — frames reduce into the
//! transcript, send acknowledgements flip local message status, and the
//! caller sees a single stream of [`ChatEvent`]s for rendering.

use tokio::sync::mpsc;

use super::connection::{ChatEvent, ConnectionHandle};
use super::frame::ClientFrame;
use super::pool::ChatPool;
use super::reducer::Transcript;
use super::status::ConnectionStatus;
use crate::errors::ChatError;

/// Buffered events between the connection task and the session consumer.
const EVENT_QUEUE: usize = 256;

pub struct ChatSession {
    workspace_id: String,
    handle: ConnectionHandle,
    events: mpsc::Receiver<ChatEvent>,
    transcript: Transcript,
}

impl ChatSession {
    /// Open (or join) the pooled connection for a workspace.
    pub async fn open(pool: &ChatPool, workspace_id: &str) -> Result<Self, ChatError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let handle = pool.connect(workspace_id, events_tx).await?;
        Ok(Self {
            workspace_id: workspace_id.to_string(),
            handle,
            events: events_rx,
            transcript: Transcript::new(),
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> ConnectionStatus {
        self.handle.status()
    }

    /// Compose and queue a user message. The transcript immediately gains
    /// it in `sending` state; [`Self::next_event`] delivers the flip to
    /// `sent` (or `error`) once the socket write resolves.
    pub async fn send_message(&mut self, content: &str) -> Result<String, ChatError> {
        let message_id = self.transcript.push_user(content);
        let frame = ClientFrame::ChatMessage {
            message_id: message_id.clone(),
            content: content.to_string(),
        };
        if let Err(e) = self.handle.send(frame).await {
            self.transcript.mark_error(&message_id);
            return Err(e);
        }
        Ok(message_id)
    }

    /// Next event from the connection, already applied to the transcript.
    /// Returns `None` when the connection task has ended and the event
    /// stream is drained.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        let event = self.events.recv().await?;
        match &event {
            ChatEvent::Frame(frame) => self.transcript.apply(frame.clone()),
            ChatEvent::Sent { message_id } => self.transcript.mark_sent(message_id),
            ChatEvent::SendFailed { message_id, .. } => self.transcript.mark_error(message_id),
            ChatEvent::StatusChanged(_) => {}
        }
        Some(event)
    }

    /// Wait until the connection first reports `connected`, or fail fast on
    /// a terminal status. Events arriving meanwhile are reduced as usual.
    pub async fn wait_connected(&mut self) -> Result<(), ChatError> {
        if self.status() == ConnectionStatus::Connected {
            return Ok(());
        }
        while let Some(event) = self.next_event().await {
            if let ChatEvent::StatusChanged(status) = event {
                match status {
                    ConnectionStatus::Connected => return Ok(()),
                    ConnectionStatus::Error => {
                        return Err(ChatError::ConnectionGone {
                            workspace_id: self.workspace_id.clone(),
                        });
                    }
                    ConnectionStatus::Connecting | ConnectionStatus::Disconnected => {}
                }
            }
        }
        Err(ChatError::ConnectionGone {
            workspace_id: self.workspace_id.clone(),
        })
    }

    /// Drop local message history (the server keeps its own).
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }
}
