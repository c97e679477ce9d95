//! Connection status machine.
//!
//! Legal transitions:
//!
//! ```text
//! disconnected -> connecting
//! connecting   -> connected | error | disconnected
//! connected    -> disconnected | error
//! error        -> connecting | disconnected
//! disconnected -> error          (retry budget exhausted between dials)
//! ```
//!
//! `connected -> connecting` without an intervening `disconnected` is
//! illegal; the tracker rejects it rather than letting a supervisor bug
//! corrupt what listeners observe.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Whether `self -> next` is a legal edge of the status machine.
    /// Re-asserting the current state is always allowed (and a no-op).
    pub fn can_transition(&self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        if *self == next {
            return true;
        }
        match (*self, next) {
            (Disconnected, Connecting) | (Disconnected, Error) => true,
            (Connecting, Connected) | (Connecting, Error) | (Connecting, Disconnected) => true,
            (Connected, Disconnected) | (Connected, Error) => true,
            (Error, Connecting) | (Error, Disconnected) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid connection status: {}", s)),
        }
    }
}

/// Illegal edge attempted on the status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal status transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Owns the current status and enforces the transition table.
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: ConnectionStatus,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConnectionStatus {
        self.current
    }

    /// Advance to `next`. Returns `Ok(true)` when the state changed,
    /// `Ok(false)` for a re-assertion of the current state.
    pub fn transition(&mut self, next: ConnectionStatus) -> Result<bool, InvalidTransition> {
        if !self.current.can_transition(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        let changed = self.current != next;
        self.current = next;
        Ok(changed)
    }
}
