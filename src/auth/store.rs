//! The two client-side token storage areas.
//!
//! The platform keeps credentials in a session-scoped area and a durable
//! area, both under fixed keys. Here those are an in-process store
//! ([`MemoryTokenStore`]) and a JSON file in the state directory
//! ([`FileTokenStore`]). [`TokenVault`] is the façade every other module
//! uses: writes go to both areas, reads prefer the session area and fall
//! back to disk.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::TokenSet;
use crate::errors::AuthError;

/// Fixed key for the access token in the durable store.
pub const ACCESS_TOKEN_KEY: &str = "atrium_access_token";
/// Fixed key for the refresh token in the durable store.
pub const REFRESH_TOKEN_KEY: &str = "atrium_refresh_token";
/// Key for the access-token expiry timestamp (RFC 3339).
pub const EXPIRES_AT_KEY: &str = "atrium_expires_at";

/// A single token storage area.
pub trait TokenStore {
    fn load(&self) -> Result<Option<TokenSet>, AuthError>;
    fn save(&self, tokens: &TokenSet) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

// ── Session-scoped area ──────────────────────────────────────────────

/// Process-lifetime token store. Cleared when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<Option<TokenSet>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenSet>, AuthError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?
            .clone())
    }

    fn save(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        *self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))? = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))? = None;
        Ok(())
    }
}

// ── Durable area ─────────────────────────────────────────────────────

/// On-disk token store: a flat JSON object under the fixed keys.
///
/// Unknown keys in the file are preserved across saves so a newer client
/// writing extra fields does not lose them to an older one.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, Value>, AuthError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|source| {
            AuthError::StoreReadFailed {
                path: self.path.clone(),
                source,
            }
        })?;
        serde_json::from_str(&raw).map_err(|source| AuthError::StoreCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_map(&self, map: &BTreeMap<String, Value>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AuthError::StoreWriteFailed {
                path: self.path.clone(),
                source,
            })?;
        }
        let raw = serde_json::to_string_pretty(map)
            .map_err(|e| anyhow::anyhow!("serialize token store: {e}"))?;
        std::fs::write(&self.path, raw).map_err(|source| AuthError::StoreWriteFailed {
            path: self.path.clone(),
            source,
        })
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenSet>, AuthError> {
        let map = self.read_map()?;
        let Some(access) = map.get(ACCESS_TOKEN_KEY).and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let refresh = map
            .get(REFRESH_TOKEN_KEY)
            .and_then(|v| v.as_str())
            .map(String::from);
        let expires_at = map
            .get(EXPIRES_AT_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));
        Ok(Some(TokenSet {
            access: access.to_string(),
            refresh,
            expires_at,
        }))
    }

    fn save(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        let mut map = self.read_map().unwrap_or_default();
        map.insert(
            ACCESS_TOKEN_KEY.to_string(),
            Value::String(tokens.access.clone()),
        );
        match &tokens.refresh {
            Some(refresh) => {
                map.insert(REFRESH_TOKEN_KEY.to_string(), Value::String(refresh.clone()));
            }
            None => {
                map.remove(REFRESH_TOKEN_KEY);
            }
        }
        match tokens.expires_at {
            Some(at) => {
                map.insert(EXPIRES_AT_KEY.to_string(), Value::String(at.to_rfc3339()));
            }
            None => {
                map.remove(EXPIRES_AT_KEY);
            }
        }
        self.write_map(&map)
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut map = match self.read_map() {
            Ok(map) => map,
            // A corrupt store should still be clearable
            Err(_) => BTreeMap::new(),
        };
        map.remove(ACCESS_TOKEN_KEY);
        map.remove(REFRESH_TOKEN_KEY);
        map.remove(EXPIRES_AT_KEY);
        if map.is_empty() && self.path.exists() {
            return std::fs::remove_file(&self.path).map_err(|source| {
                AuthError::StoreWriteFailed {
                    path: self.path.clone(),
                    source,
                }
            });
        }
        self.write_map(&map)
    }
}

// ── Vault ────────────────────────────────────────────────────────────

/// Façade over both storage areas.
///
/// Every consult goes through here: reads prefer the session area and lazily
/// warm it from disk; writes and clears hit both areas so the two can never
/// disagree for longer than one operation.
#[derive(Debug, Clone)]
pub struct TokenVault {
    session: MemoryTokenStore,
    durable: FileTokenStore,
}

impl TokenVault {
    pub fn new(durable_path: PathBuf) -> Self {
        Self {
            session: MemoryTokenStore::new(),
            durable: FileTokenStore::new(durable_path),
        }
    }

    /// Current token set, if signed in.
    pub fn load(&self) -> Result<Option<TokenSet>, AuthError> {
        if let Some(tokens) = self.session.load()? {
            return Ok(Some(tokens));
        }
        let from_disk = self.durable.load()?;
        if let Some(tokens) = &from_disk {
            self.session.save(tokens)?;
        }
        Ok(from_disk)
    }

    /// Current token set, or `AuthError::NotSignedIn`.
    pub fn require(&self) -> Result<TokenSet, AuthError> {
        self.load()?.ok_or(AuthError::NotSignedIn)
    }

    pub fn store(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        self.session.save(tokens)?;
        self.durable.save(tokens)
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        self.session.clear()?;
        self.durable.clear()
    }
}
