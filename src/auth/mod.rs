//! Credential lifecycle: token model, the two client-side storage areas,
//! and the session expiry watchdog.

pub mod store;
pub mod watchdog;

pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenVault};
pub use watchdog::{SessionHealth, run_watchdog};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An access/refresh token pair as issued by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
    /// Server-reported expiry of the access token, when known.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the access token is already past its expiry.
    /// Tokens without a known expiry are assumed live; the server is the
    /// authority and will answer 401 when they are not.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at <= Utc::now(),
            None => false,
        }
    }

    /// Whether the access token expires within `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        match self.expires_at {
            Some(at) => {
                let window = chrono::TimeDelta::from_std(window).unwrap_or(chrono::TimeDelta::MAX);
                at <= Utc::now() + window
            }
            None => false,
        }
    }
}
