//! Terminal rendering for the chat session, via `console` styling and an
//! `indicatif` spinner while the assistant is thinking.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

use crate::api::Workspace;
use crate::chat::{ChatEvent, ConnectionStatus, MessageMetadata, ServerFrame, WorkspaceData};

/// Renders connection events and streamed content to the terminal.
///
/// Streaming output is printed incrementally: a spinner runs from send
/// until the first chunk, then chunks append to the line as they arrive
/// and the completion frame closes it with a metadata footer.
pub struct ChatRenderer {
    verbose: bool,
    spinner: Option<ProgressBar>,
    streaming_id: Option<String>,
}

impl ChatRenderer {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            spinner: None,
            streaming_id: None,
        }
    }

    /// Start the "thinking" spinner after a user message goes out.
    pub fn begin_waiting(&mut self) {
        self.clear_spinner();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        spinner.set_message("thinking...");
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    pub fn on_event(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::StatusChanged(status) => self.print_status(*status),
            ChatEvent::Frame(frame) => self.on_frame(frame),
            ChatEvent::Sent { .. } => {}
            ChatEvent::SendFailed { reason, .. } => {
                self.clear_spinner();
                println!("{} message not sent: {reason}", style("✗").red());
            }
        }
    }

    fn on_frame(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::ConnectionEstablished { connection_id } => {
                if self.verbose
                    && let Some(id) = connection_id
                {
                    println!("{}", style(format!("session ready ({id})")).dim());
                }
            }
            ServerFrame::StreamChunk {
                message_id,
                content,
            } => {
                self.clear_spinner();
                if self.streaming_id.as_deref() != Some(message_id) {
                    self.streaming_id = Some(message_id.clone());
                    print!("{} ", style("assistant ▸").cyan().bold());
                }
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
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
                self.clear_spinner();
                let streamed = self.streaming_id.take().as_deref() == message_id.as_deref();
                if streamed {
                    println!();
                } else if let Some(body) = content {
                    // Whole reply arrived in one frame
                    println!("{} {body}", style("assistant ▸").cyan().bold());
                }
                if rich_content.is_some() {
                    println!("{}", style("[rich content attached]").dim().italic());
                }
                let meta = crate::chat::frame::completion_metadata(
                    model_used.clone(),
                    *total_cost,
                    *tokens_used,
                    provider.clone(),
                    metadata.clone(),
                );
                self.print_metadata(&meta);
            }
            ServerFrame::WorkspaceUpdate { workspace_data } => {
                if self.verbose {
                    println!(
                        "{}",
                        style(format!("workspace update: {}", summarize(workspace_data))).dim()
                    );
                }
            }
        }
    }

    fn print_status(&mut self, status: ConnectionStatus) {
        // Don't interleave status noise with a streaming line
        if self.streaming_id.is_some() {
            println!();
            self.streaming_id = None;
        }
        let line = match status {
            ConnectionStatus::Connected => style("● connected").green().to_string(),
            ConnectionStatus::Connecting => style("○ connecting...").yellow().to_string(),
            ConnectionStatus::Disconnected => style("○ disconnected").dim().to_string(),
            ConnectionStatus::Error => style("✗ connection failed").red().to_string(),
        };
        println!("{line}");
    }

    fn print_metadata(&self, meta: &MessageMetadata) {
        if meta.is_empty() || !self.verbose {
            return;
        }
        let mut parts = Vec::new();
        if let Some(model) = &meta.model_used {
            parts.push(model.clone());
        }
        if let Some(tokens) = meta.tokens_used {
            parts.push(format!("{tokens} tokens"));
        }
        if let Some(cost) = meta.total_cost {
            parts.push(format!("${cost:.4}"));
        }
        if let Some(provider) = &meta.provider {
            parts.push(provider.clone());
        }
        println!("{}", style(parts.join(" · ")).dim());
    }
}

/// Header printed when a chat opens.
pub fn print_workspace_banner(workspace: &Workspace) {
    println!(
        "{} {}",
        style(&workspace.name).bold(),
        style(format!("({})", workspace.id)).dim()
    );
    if let Some(description) = &workspace.description {
        println!("{}", style(description).dim());
    }
    println!(
        "{}",
        style("type a message and press enter · /clear resets · /quit exits").dim()
    );
}

fn summarize(data: &WorkspaceData) -> String {
    format!(
        "{} agents, {} executions, {} collaborators",
        data.agent_count.map_or("?".to_string(), |n| n.to_string()),
        data.execution_count
            .map_or("?".to_string(), |n| n.to_string()),
        data.collaborator_count
            .map_or("?".to_string(), |n| n.to_string()),
    )
}
