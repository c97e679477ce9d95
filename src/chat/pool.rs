//! Owned connection pool: at most one live socket per workspace.
//!
//! The pool replaces any notion of a process-global registry. It is
//! constructed once, injected wherever connections are needed, and owns
//! every supervising task it spawns. Membership is serialized behind an
//! async mutex, so two callers racing to open the same workspace coalesce
//! onto one connection instead of double-dialing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use super::connection::{ChatEvent, ChatTarget, ConnectionHandle, spawn_connection};
use super::retry::RetryPolicy;
use crate::api::ApiClient;
use crate::errors::ChatError;

struct PoolEntry {
    handle: ConnectionHandle,
    task: JoinHandle<Result<(), ChatError>>,
}

/// Pool of workspace chat connections, keyed by workspace id.
#[derive(Clone)]
pub struct ChatPool {
    api: ApiClient,
    policy: RetryPolicy,
    entries: Arc<Mutex<HashMap<String, PoolEntry>>>,
}

impl ChatPool {
    pub fn new(api: ApiClient, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Connect to a workspace, reusing the live connection when one exists.
    ///
    /// A fresh connection first asks the server for a chat session id, then
    /// spawns the supervisor. `events` only binds for the caller that
    /// actually creates the connection; reusers share the original stream.
    pub async fn connect(
        &self,
        workspace_id: &str,
        events: mpsc::Sender<ChatEvent>,
    ) -> Result<ConnectionHandle, ChatError> {
        // Held across the awaits below: membership changes are serialized
        // so concurrent connects for one workspace coalesce.
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(workspace_id) {
            if entry.handle.is_live() {
                debug!("reusing live connection for workspace {workspace_id}");
                return Ok(entry.handle.clone());
            }
            // Supervisor finished (error or sign-out): replace it.
            entries.remove(workspace_id);
        }

        let session = self.api.create_chat_session(workspace_id).await?;

        let target = ChatTarget {
            base_url: self.api.base_url().to_string(),
            session_id: session.session_id,
            workspace_id: workspace_id.to_string(),
        };
        let (handle, task) = spawn_connection(
            target,
            self.api.vault().clone(),
            self.policy,
            events,
        );

        entries.insert(
            workspace_id.to_string(),
            PoolEntry {
                handle: handle.clone(),
                task,
            },
        );
        Ok(handle)
    }

    /// Shut down and remove one workspace connection, returning the
    /// supervisor's verdict. Unknown ids are a no-op.
    pub async fn release(&self, workspace_id: &str) -> Option<Result<(), ChatError>> {
        let entry = self.entries.lock().await.remove(workspace_id)?;
        entry.handle.shutdown();
        match entry.task.await {
            Ok(result) => Some(result),
            Err(join_err) => Some(Err(ChatError::Other(anyhow::anyhow!(
                "connection task panicked: {join_err}"
            )))),
        }
    }

    /// Shut down every connection. Called on sign-out and at exit.
    pub async fn shutdown_all(&self) {
        let entries: Vec<(String, PoolEntry)> = {
            let mut map = self.entries.lock().await;
            map.drain().collect()
        };
        for (workspace_id, entry) in entries {
            debug!("shutting down connection for workspace {workspace_id}");
            entry.handle.shutdown();
            let _ = entry.task.await;
        }
    }

    /// Number of tracked connections (live or finished-but-unreaped).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
