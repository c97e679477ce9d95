//! Pure reducer over the in-memory transcript.
//!
//! All mutation of the message list goes through [`Transcript::apply`] (for
//! inbound frames) and the local-send helpers; nothing here does I/O, so
//! every protocol property is unit-testable without a socket.

use tracing::{debug, warn};

use super::frame::{ServerFrame, completion_metadata};
use super::message::{Message, MessageStatus, WorkspaceData};

/// Ordered message list plus the workspace snapshot, for one chat session.
/// Insertion order is never changed; chunks mutate messages in place.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    workspace: WorkspaceData,
    connection_id: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn workspace(&self) -> &WorkspaceData {
        &self.workspace
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    // ── Inbound frames ───────────────────────────────────────────────

    /// Apply one server frame.
    pub fn apply(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::ConnectionEstablished { connection_id } => {
                self.connection_id = connection_id;
            }

            ServerFrame::StreamChunk {
                message_id,
                content,
            } => self.apply_chunk(message_id, content),

            ServerFrame::Complete {
                message_id,
                content,
                model_used,
                total_cost,
                tokens_used,
                provider,
                metadata,
                rich_content,
            } => {
                let meta =
                    completion_metadata(model_used, total_cost, tokens_used, provider, metadata);
                self.apply_complete(message_id, content, meta, rich_content);
            }

            ServerFrame::WorkspaceUpdate { workspace_data } => {
                self.workspace.merge(workspace_data);
            }
        }
    }

    fn apply_chunk(&mut self, message_id: String, content: String) {
        if let Some(message) = self.find_mut(&message_id) {
            if !message.status.accepts_chunks() {
                // Completed content is immutable; a late chunk is a server
                // anomaly, not something to splice in.
                warn!(
                    "dropping stream_chunk for message {message_id} in state {}",
                    message.status.as_str()
                );
                return;
            }
            message.content.push_str(&content);
        } else {
            self.messages.push(Message::streaming(message_id, content));
        }
    }

    fn apply_complete(
        &mut self,
        message_id: Option<String>,
        content: Option<String>,
        meta: super::message::MessageMetadata,
        rich_content: Option<serde_json::Value>,
    ) {
        let Some(message_id) = message_id else {
            warn!("dropping completion frame without message_id");
            return;
        };

        if let Some(message) = self.find_mut(&message_id) {
            message.status = MessageStatus::Sent;
            // Streamed content wins; the frame body only fills a void.
            if message.content.is_empty()
                && let Some(body) = content
            {
                message.content = body;
            }
            if !meta.is_empty() {
                message.metadata = Some(meta);
            }
            if rich_content.is_some() {
                message.rich_content = rich_content;
            }
        } else {
            // Completion for a message we never saw streaming: synthesize it.
            debug!("completion for unseen message {message_id}, synthesizing");
            let mut message = Message::streaming(message_id, content.unwrap_or_default());
            message.status = MessageStatus::Sent;
            if !meta.is_empty() {
                message.metadata = Some(meta);
            }
            message.rich_content = rich_content;
            self.messages.push(message);
        }
    }

    // ── Local sends ──────────────────────────────────────────────────

    /// Append a locally composed user message in `sending` state and
    /// return its id.
    pub fn push_user(&mut self, content: impl Into<String>) -> String {
        let message = Message::user(content);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Socket write succeeded for a local message.
    pub fn mark_sent(&mut self, id: &str) {
        if let Some(message) = self.find_mut(id)
            && message.status == MessageStatus::Sending
        {
            message.status = MessageStatus::Sent;
        }
    }

    /// Socket write failed for a local message.
    pub fn mark_error(&mut self, id: &str) {
        if let Some(message) = self.find_mut(id) {
            message.status = MessageStatus::Error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::{MessageMetadata, Role};

    fn chunk(id: &str, content: &str) -> ServerFrame {
        ServerFrame::StreamChunk {
            message_id: id.to_string(),
            content: content.to_string(),
        }
    }

    fn complete(id: &str) -> ServerFrame {
        ServerFrame::Complete {
            message_id: Some(id.to_string()),
            content: None,
            model_used: Some("sonnet-4".to_string()),
            total_cost: Some(0.002),
            tokens_used: Some(64),
            provider: Some("anthropic".to_string()),
            metadata: None,
            rich_content: None,
        }
    }

    #[test]
    fn chunks_concatenate_in_arrival_order() {
        let mut transcript = Transcript::new();
        transcript.apply(chunk("m1", "The "));
        transcript.apply(chunk("m1", "answer "));
        transcript.apply(chunk("m1", "is 42."));

        assert_eq!(transcript.len(), 1);
        let message = &transcript.messages()[0];
        assert_eq!(message.content, "The answer is 42.");
        assert_eq!(message.status, MessageStatus::Streaming);
        assert_eq!(message.role, Role::Assistant);
    }

    #[test]
    fn interleaved_streams_stay_separate() {
        let mut transcript = Transcript::new();
        transcript.apply(chunk("m1", "a"));
        transcript.apply(chunk("m2", "x"));
        transcript.apply(chunk("m1", "b"));
        transcript.apply(chunk("m2", "y"));

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].content, "ab");
        assert_eq!(transcript.messages()[1].content, "xy");
    }

    #[test]
    fn complete_finalizes_streaming_message() {
        let mut transcript = Transcript::new();
        transcript.apply(chunk("m1", "Hello"));
        transcript.apply(complete("m1"));

        let message = &transcript.messages()[0];
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.content, "Hello");
        let meta = message.metadata.as_ref().unwrap();
        assert_eq!(meta.model_used.as_deref(), Some("sonnet-4"));
        assert_eq!(meta.tokens_used, Some(64));
    }

    #[test]
    fn complete_for_unseen_id_synthesizes_exactly_one_sent_message() {
        let mut transcript = Transcript::new();
        transcript.apply(ServerFrame::Complete {
            message_id: Some("m9".to_string()),
            content: Some("Full reply.".to_string()),
            model_used: None,
            total_cost: None,
            tokens_used: None,
            provider: None,
            metadata: None,
            rich_content: None,
        });

        assert_eq!(transcript.len(), 1);
        let message = &transcript.messages()[0];
        assert_eq!(message.id, "m9");
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.content, "Full reply.");
    }

    #[test]
    fn chunk_after_complete_is_a_noop() {
        let mut transcript = Transcript::new();
        transcript.apply(chunk("m1", "Hello"));
        transcript.apply(complete("m1"));
        transcript.apply(chunk("m1", " world"));

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "Hello");
        assert_eq!(transcript.messages()[0].status, MessageStatus::Sent);
    }

    #[test]
    fn streamed_content_wins_over_completion_body() {
        let mut transcript = Transcript::new();
        transcript.apply(chunk("m1", "streamed text"));
        transcript.apply(ServerFrame::Complete {
            message_id: Some("m1".to_string()),
            content: Some("replacement body".to_string()),
            model_used: None,
            total_cost: None,
            tokens_used: None,
            provider: None,
            metadata: None,
            rich_content: None,
        });

        assert_eq!(transcript.messages()[0].content, "streamed text");
    }

    #[test]
    fn completion_without_message_id_is_dropped() {
        let mut transcript = Transcript::new();
        transcript.apply(ServerFrame::Complete {
            message_id: None,
            content: Some("orphan".to_string()),
            model_used: None,
            total_cost: None,
            tokens_used: None,
            provider: None,
            metadata: None,
            rich_content: None,
        });
        assert!(transcript.is_empty());
    }

    #[test]
    fn completion_attaches_rich_content() {
        let mut transcript = Transcript::new();
        transcript.apply(chunk("m1", "chart below"));
        transcript.apply(ServerFrame::Complete {
            message_id: Some("m1".to_string()),
            content: None,
            model_used: None,
            total_cost: None,
            tokens_used: None,
            provider: None,
            metadata: Some(MessageMetadata {
                model_used: Some("sonnet-4".to_string()),
                ..Default::default()
            }),
            rich_content: Some(serde_json::json!({"kind": "chart"})),
        });

        let message = &transcript.messages()[0];
        assert_eq!(message.rich_content.as_ref().unwrap()["kind"], "chart");
        assert_eq!(
            message.metadata.as_ref().unwrap().model_used.as_deref(),
            Some("sonnet-4")
        );
    }

    #[test]
    fn workspace_updates_merge_shallowly() {
        let mut transcript = Transcript::new();
        transcript.apply(ServerFrame::WorkspaceUpdate {
            workspace_data: WorkspaceData {
                agent_count: Some(2),
                execution_count: Some(7),
                collaborator_count: None,
            },
        });
        transcript.apply(ServerFrame::WorkspaceUpdate {
            workspace_data: WorkspaceData {
                agent_count: None,
                execution_count: Some(8),
                collaborator_count: None,
            },
        });

        assert_eq!(transcript.workspace().agent_count, Some(2));
        assert_eq!(transcript.workspace().execution_count, Some(8));
    }

    #[test]
    fn connection_established_records_id() {
        let mut transcript = Transcript::new();
        transcript.apply(ServerFrame::ConnectionEstablished {
            connection_id: Some("conn-7".to_string()),
        });
        assert_eq!(transcript.connection_id(), Some("conn-7"));
        assert!(transcript.is_empty());
    }

    #[test]
    fn user_send_lifecycle() {
        let mut transcript = Transcript::new();
        let id = transcript.push_user("Analyze costs");

        assert_eq!(transcript.messages()[0].status, MessageStatus::Sending);
        assert_eq!(transcript.messages()[0].role, Role::User);

        transcript.mark_sent(&id);
        assert_eq!(transcript.messages()[0].status, MessageStatus::Sent);
    }

    #[test]
    fn mark_sent_does_not_resurrect_errored_message() {
        let mut transcript = Transcript::new();
        let id = transcript.push_user("hi");
        transcript.mark_error(&id);
        transcript.mark_sent(&id);
        assert_eq!(transcript.messages()[0].status, MessageStatus::Error);
    }

    #[test]
    fn ordering_is_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("first");
        transcript.apply(chunk("m1", "second"));
        transcript.push_user("third");

        let contents: Vec<&str> = transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }
}
