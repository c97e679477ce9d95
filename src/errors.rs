//! Typed error hierarchy for the Atrium client.
//!
//! Three top-level enums cover the three subsystems:
//! - `AuthError` — credential storage, login, and refresh failures
//! - `ApiError` — REST transport and response failures
//! - `ChatError` — WebSocket dial, protocol, and supervision failures

use thiserror::Error;

/// Errors from the credential subsystem (stores, login, refresh).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No credentials stored. Run 'atrium login' first")]
    NotSignedIn,

    #[error("Access token expired and no refresh token is available")]
    SessionExpired,

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Failed to read token store at {path}: {source}")]
    StoreReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write token store at {path}: {source}")]
    StoreWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Token store at {path} is corrupt: {source}")]
    StoreCorrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the REST wrapper.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the chat connection layer.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Server closed the connection with policy/auth code {code}: {reason}")]
    ClosedByPolicy { code: u16, reason: String },

    #[error("Gave up reconnecting after {attempts} consecutive failures")]
    RetriesExhausted { attempts: u32 },

    #[error("Connection to workspace {workspace_id} is no longer running")]
    ConnectionGone { workspace_id: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
