//! Supervised WebSocket connection to one workspace chat.
//!
//! Each connection is a single tokio task owning the socket. The supervisor
//! re-dials on ordinary drops using the backoff schedule, rebuilds the
//! endpoint URL with fresh credentials on every dial, and stops permanently
//! on auth/policy closes, on budget exhaustion, on sign-out, or on explicit
//! shutdown. Frames, send acknowledgements, and status changes flow to the
//! owner over an event channel; shutdown flows back over a watch channel,
//! checked at every await point.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::frame::{ClientFrame, ServerFrame, is_terminal_close};
use super::retry::{Backoff, RetryPolicy};
use super::status::{ConnectionStatus, StatusTracker};
use crate::auth::TokenVault;
use crate::errors::ChatError;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound messages queued while the socket is down are capped here; the
/// send side backpressures rather than buffering without bound.
const OUTBOUND_QUEUE: usize = 64;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ── Events ───────────────────────────────────────────────────────────

/// What a connection reports to its owner.
#[derive(Debug)]
pub enum ChatEvent {
    StatusChanged(ConnectionStatus),
    Frame(ServerFrame),
    /// The socket write for a local message succeeded.
    Sent { message_id: String },
    /// The socket write for a local message failed; the message should be
    /// flagged in the transcript.
    SendFailed { message_id: String, reason: String },
}

// ── Dial target ──────────────────────────────────────────────────────

/// Everything needed to rebuild the endpoint URL with fresh credentials.
#[derive(Debug, Clone)]
pub struct ChatTarget {
    /// HTTP(S) base URL of the platform.
    pub base_url: String,
    pub session_id: String,
    pub workspace_id: String,
}

impl ChatTarget {
    /// `https://host` dials `wss://host/ws/chat/{session}/?...`; plain
    /// `http://` stays `ws://` for local development servers.
    pub fn url(&self, access_token: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{base}")
        };
        format!(
            "{ws_base}/ws/chat/{}/?token={access_token}&workspace_id={}",
            self.session_id, self.workspace_id
        )
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Cheap-to-clone handle to a running connection. All clones talk to the
/// same task; the pool owns the task itself.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    workspace_id: String,
    outbound: mpsc::Sender<ClientFrame>,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Whether the supervising task is still running and not in a terminal
    /// error state. A live connection may still be mid-reconnect.
    pub fn is_live(&self) -> bool {
        !self.outbound.is_closed() && self.status() != ConnectionStatus::Error
    }

    /// Queue a frame for sending. Write success/failure is reported via
    /// [`ChatEvent::Sent`] / [`ChatEvent::SendFailed`].
    pub async fn send(&self, frame: ClientFrame) -> Result<(), ChatError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ChatError::ConnectionGone {
                workspace_id: self.workspace_id.clone(),
            })
    }

    /// Wait until the status changes, returning the new value. Used by
    /// callers that block on `connected` before sending.
    pub async fn status_changed(&mut self) -> Result<ConnectionStatus, ChatError> {
        self.status
            .changed()
            .await
            .map_err(|_| ChatError::ConnectionGone {
                workspace_id: self.workspace_id.clone(),
            })?;
        Ok(*self.status.borrow())
    }

    /// Ask the supervisor to stop. Idempotent, fire-and-forget; the task
    /// drains at its next await point.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the supervising task for one workspace connection.
pub fn spawn_connection(
    target: ChatTarget,
    vault: TokenVault,
    policy: RetryPolicy,
    events: mpsc::Sender<ChatEvent>,
) -> (ConnectionHandle, JoinHandle<Result<(), ChatError>>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = ConnectionHandle {
        workspace_id: target.workspace_id.clone(),
        outbound: outbound_tx,
        status: status_rx,
        shutdown: Arc::new(shutdown_tx),
    };

    let task = tokio::spawn(supervise(
        target,
        vault,
        policy,
        outbound_rx,
        events,
        status_tx,
        shutdown_rx,
    ));

    (handle, task)
}

// ── Supervisor ───────────────────────────────────────────────────────

/// Why one pass of the socket loop ended.
enum LoopExit {
    /// Explicit shutdown or all event listeners gone.
    Shutdown,
    /// Ordinary loss (close, read error, missed pong); worth re-dialing.
    Lost(String),
    /// Auth/policy close; do not reconnect.
    Policy { code: u16, reason: String },
}

struct Supervisor {
    tracker: StatusTracker,
    status_tx: watch::Sender<ConnectionStatus>,
    events: mpsc::Sender<ChatEvent>,
}

impl Supervisor {
    /// Advance the status machine and fan the change out to watchers and
    /// the event channel. An illegal edge is a supervisor bug: logged and
    /// skipped so listeners never observe it.
    async fn set_status(&mut self, next: ConnectionStatus) {
        match self.tracker.transition(next) {
            Ok(true) => {
                let _ = self.status_tx.send(next);
                let _ = self.events.send(ChatEvent::StatusChanged(next)).await;
            }
            Ok(false) => {}
            Err(e) => warn!("connection supervisor: {e}"),
        }
    }
}

async fn supervise(
    target: ChatTarget,
    vault: TokenVault,
    policy: RetryPolicy,
    mut outbound: mpsc::Receiver<ClientFrame>,
    events: mpsc::Sender<ChatEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ChatError> {
    let mut sup = Supervisor {
        tracker: StatusTracker::new(),
        status_tx,
        events,
    };
    let mut backoff = Backoff::new(policy);

    loop {
        if *shutdown.borrow() {
            sup.set_status(ConnectionStatus::Disconnected).await;
            return Ok(());
        }

        // Reconnects only make sense while we still hold credentials.
        let access = match vault.load() {
            Ok(Some(tokens)) => tokens.access,
            Ok(None) => {
                debug!("no credentials, stopping connection supervisor");
                sup.set_status(ConnectionStatus::Disconnected).await;
                return Ok(());
            }
            Err(e) => {
                sup.set_status(ConnectionStatus::Error).await;
                return Err(e.into());
            }
        };

        sup.set_status(ConnectionStatus::Connecting).await;
        let url = target.url(&access);

        let dial = tokio::select! {
            result = connect_async(url.as_str()) => result,
            // A closed channel means every handle is gone: same as shutdown.
            _ = shutdown.changed() => {
                sup.set_status(ConnectionStatus::Disconnected).await;
                return Ok(());
            }
        };

        match dial {
            Ok((ws, _response)) => {
                backoff.reset();
                sup.set_status(ConnectionStatus::Connected).await;
                debug!("connected to workspace {}", target.workspace_id);

                let (sender, receiver) = ws.split();
                let exit =
                    run_socket_loop(sender, receiver, &mut outbound, &sup.events, &mut shutdown)
                        .await;

                match exit {
                    LoopExit::Shutdown => {
                        sup.set_status(ConnectionStatus::Disconnected).await;
                        return Ok(());
                    }
                    LoopExit::Policy { code, reason } => {
                        warn!(
                            "workspace {} closed by policy ({code}): {reason}",
                            target.workspace_id
                        );
                        sup.set_status(ConnectionStatus::Error).await;
                        return Err(ChatError::ClosedByPolicy { code, reason });
                    }
                    LoopExit::Lost(reason) => {
                        debug!("connection lost: {reason}");
                        sup.set_status(ConnectionStatus::Disconnected).await;
                    }
                }
            }
            Err(e) => {
                warn!("dial failed for workspace {}: {e}", target.workspace_id);
                sup.set_status(ConnectionStatus::Disconnected).await;
            }
        }

        match backoff.next_delay() {
            Some(delay) => {
                debug!(
                    "reconnecting to workspace {} in {delay:?} (attempt {})",
                    target.workspace_id,
                    backoff.attempts()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        sup.set_status(ConnectionStatus::Disconnected).await;
                        return Ok(());
                    }
                }
            }
            None => {
                sup.set_status(ConnectionStatus::Error).await;
                return Err(ChatError::RetriesExhausted {
                    attempts: backoff.attempts(),
                });
            }
        }
    }
}

/// One pass over a live socket with ping/pong keepalive.
///
/// Combines outbound draining, inbound frame parsing, and periodic
/// ping/pong health checking into a single select loop. If no Pong is
/// received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the pass ends.
async fn run_socket_loop(
    mut sender: WsSink,
    mut receiver: WsSource,
    outbound: &mut mpsc::Receiver<ClientFrame>,
    events: &mpsc::Sender<ChatEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> LoopExit {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Shutdown ────────────────────────────────────────────
            changed = shutdown.changed() => {
                // A closed channel means every handle is gone: same as
                // an explicit shutdown.
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sender.send(Message::Close(None)).await;
                    return LoopExit::Shutdown;
                }
            }

            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    return LoopExit::Lost("pong timeout".to_string());
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return LoopExit::Lost("ping write failed".to_string());
                }
                awaiting_pong = true;
            }

            // ── Outbound frames ─────────────────────────────────────
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // Every handle dropped; nothing can be sent anymore.
                    let _ = sender.send(Message::Close(None)).await;
                    return LoopExit::Shutdown;
                };
                let message_id = frame.message_id().to_string();
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        let _ = events.send(ChatEvent::SendFailed {
                            message_id,
                            reason: format!("serialize: {e}"),
                        }).await;
                        continue;
                    }
                };
                match sender.send(Message::Text(json.into())).await {
                    Ok(()) => {
                        let _ = events.send(ChatEvent::Sent { message_id }).await;
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        let _ = events.send(ChatEvent::SendFailed {
                            message_id,
                            reason: reason.clone(),
                        }).await;
                        return LoopExit::Lost(reason);
                    }
                }
            }

            // ── Inbound frames ──────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(frame) = ServerFrame::parse(text.as_str())
                            && events.send(ChatEvent::Frame(frame)).await.is_err()
                        {
                            // Owner gone; treat like shutdown.
                            let _ = sender.send(Message::Close(None)).await;
                            return LoopExit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sender.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) => {
                                let code = u16::from(frame.code);
                                let reason = frame.reason.to_string();
                                if is_terminal_close(code) {
                                    LoopExit::Policy { code, reason }
                                } else {
                                    LoopExit::Lost(format!("closed ({code}): {reason}"))
                                }
                            }
                            None => LoopExit::Lost("closed without a frame".to_string()),
                        };
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames are not part of the protocol
                    }
                    Some(Err(e)) => return LoopExit::Lost(e.to_string()),
                    None => return LoopExit::Lost("stream ended".to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_upgrades_scheme_and_carries_params() {
        let target = ChatTarget {
            base_url: "https://atrium.example.com".to_string(),
            session_id: "sess-1".to_string(),
            workspace_id: "ws-9".to_string(),
        };
        assert_eq!(
            target.url("tok"),
            "wss://atrium.example.com/ws/chat/sess-1/?token=tok&workspace_id=ws-9"
        );

        let local = ChatTarget {
            base_url: "http://localhost:8000/".to_string(),
            session_id: "s".to_string(),
            workspace_id: "w".to_string(),
        };
        assert!(local.url("t").starts_with("ws://localhost:8000/ws/chat/s/"));
    }

    #[test]
    fn keepalive_constants() {
        // PONG_TIMEOUT must exceed PING_INTERVAL so a fresh connection is
        // not immediately considered dead.
        assert!(PONG_TIMEOUT > PING_INTERVAL);
    }

    #[tokio::test]
    async fn handle_reports_gone_after_task_end() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::new(dir.path().join("tokens.json"));
        // No credentials stored: the supervisor exits immediately.
        let (events_tx, _events_rx) = mpsc::channel(8);
        let target = ChatTarget {
            base_url: "http://127.0.0.1:1".to_string(),
            session_id: "s".to_string(),
            workspace_id: "w".to_string(),
        };
        let (handle, task) =
            spawn_connection(target, vault, RetryPolicy::default(), events_tx);

        let result = task.await.unwrap();
        assert!(result.is_ok());

        let err = handle
            .send(ClientFrame::ChatMessage {
                message_id: "m".to_string(),
                content: "hi".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ConnectionGone { .. }));
    }

    #[tokio::test]
    async fn dial_failure_exhausts_budget_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::new(dir.path().join("tokens.json"));
        vault
            .store(&crate::auth::TokenSet::new("tok", None))
            .unwrap();

        let (events_tx, mut events_rx) = mpsc::channel(64);
        // Port 1 refuses connections; keep delays tiny.
        let target = ChatTarget {
            base_url: "http://127.0.0.1:1".to_string(),
            session_id: "s".to_string(),
            workspace_id: "w".to_string(),
        };
        let policy = RetryPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(2),
            2,
        );
        let (handle, task) = spawn_connection(target, vault, policy, events_tx);

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ChatError::RetriesExhausted { attempts: 2 })
        ));
        assert_eq!(handle.status(), ConnectionStatus::Error);

        // The event stream must have announced Connecting before Error and
        // never jumped straight to Connected.
        let mut saw_connecting = false;
        while let Ok(event) = events_rx.try_recv() {
            if let ChatEvent::StatusChanged(status) = event {
                match status {
                    ConnectionStatus::Connecting => saw_connecting = true,
                    ConnectionStatus::Connected => panic!("never connected"),
                    _ => {}
                }
            }
        }
        assert!(saw_connecting);
    }

    #[tokio::test]
    async fn shutdown_before_dial_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::new(dir.path().join("tokens.json"));
        vault
            .store(&crate::auth::TokenSet::new("tok", None))
            .unwrap();

        let (events_tx, _events_rx) = mpsc::channel(8);
        let target = ChatTarget {
            base_url: "http://127.0.0.1:1".to_string(),
            session_id: "s".to_string(),
            workspace_id: "w".to_string(),
        };
        let (handle, task) = spawn_connection(
            target,
            vault,
            RetryPolicy::new(Duration::from_secs(60), Duration::from_secs(60), 100),
            events_tx,
        );

        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor must honor shutdown promptly")
            .unwrap();
        assert!(result.is_ok());
    }
}
