//! Authenticated REST wrapper for the Atrium platform.
//!
//! Every call goes through [`ApiClient::request`], which attaches the bearer
//! token from the vault and, on a 401, performs exactly one
//! refresh-and-retry before propagating the failure. Only the endpoints the
//! CLI needs are typed here; the platform's wider CRUD surface is out of
//! scope for this client.

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{TokenSet, TokenVault};
use crate::errors::{ApiError, AuthError};

// ── Request/response payload types ───────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
    /// Access-token lifetime in seconds, when the server reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// The signed-in user, as returned by `GET /api/users/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A workspace summary, as returned by `GET /api/workspaces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A chat session handle issued by the server; its id goes into the
/// WebSocket endpoint path.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSessionInfo {
    pub session_id: String,
}

// ── Client ───────────────────────────────────────────────────────────

/// REST client holding the HTTP connection pool and the token vault.
///
/// Cheap to clone; clones share the pool and the vault.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    vault: TokenVault,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, vault: TokenVault) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vault,
        }
    }

    pub fn vault(&self) -> &TokenVault {
        &self.vault
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ── Auth flows ───────────────────────────────────────────────────

    /// Exchange credentials for a token set and persist it to both stores.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let url = self.endpoint("/api/auth/login");
        let resp = self
            .http
            .post(&url)
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::BAD_REQUEST {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::LoginRejected(body).into());
        }
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let issued: LoginResponse = resp
            .json()
            .await
            .map_err(|source| ApiError::Decode {
                url: url.clone(),
                source,
            })?;
        self.vault.store(&token_set_from(
            issued.access,
            issued.refresh,
            issued.expires_in,
        ))?;

        self.me().await
    }

    /// Clear both token stores. Best effort server-side; local state is
    /// authoritative for sign-out.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.vault.clear()
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Called by the request wrapper on 401 and by the expiry watchdog.
    /// Rotates the stored refresh token when the server returns a new one.
    pub async fn refresh(&self) -> Result<TokenSet, ApiError> {
        let current = self.vault.require()?;
        let Some(refresh) = current.refresh.as_deref() else {
            return Err(AuthError::SessionExpired.into());
        };

        let url = self.endpoint("/api/auth/refresh");
        let resp = self
            .http
            .post(&url)
            .json(&RefreshRequest { refresh })
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::BAD_REQUEST
        {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::RefreshRejected(body).into());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let rotated: RefreshResponse = resp
            .json()
            .await
            .map_err(|source| ApiError::Decode {
                url: url.clone(),
                source,
            })?;
        let tokens = token_set_from(
            rotated.access,
            rotated.refresh.or(current.refresh),
            rotated.expires_in,
        );
        self.vault.store(&tokens)?;
        debug!("refreshed access token");
        Ok(tokens)
    }

    // ── Core wrapper ─────────────────────────────────────────────────

    /// Send an authenticated request; on 401, refresh once and retry once.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path);

        let resp = self.send_once(&method, &url, body).await?;
        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("401 from {path}, attempting token refresh");
            self.refresh().await?;
            self.send_once(&method, &url, body).await?
        } else {
            resp
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }
        resp.json()
            .await
            .map_err(|source| ApiError::Decode { url, source })
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut req = self.http.request(method.clone(), url);
        if let Ok(Some(tokens)) = self.vault.load() {
            req = req.bearer_auth(&tokens.access);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })
    }

    // ── Typed endpoints ──────────────────────────────────────────────

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.request(Method::GET, "/api/users/me", None).await
    }

    pub async fn workspaces(&self) -> Result<Vec<Workspace>, ApiError> {
        self.request(Method::GET, "/api/workspaces", None).await
    }

    pub async fn workspace(&self, id: &str) -> Result<Workspace, ApiError> {
        self.request(Method::GET, &format!("/api/workspaces/{id}"), None)
            .await
    }

    /// Create a chat session in a workspace; its id names the WebSocket path.
    pub async fn create_chat_session(&self, workspace_id: &str) -> Result<ChatSessionInfo, ApiError> {
        self.request(
            Method::POST,
            &format!("/api/workspaces/{workspace_id}/sessions"),
            Some(&serde_json::json!({})),
        )
        .await
    }
}

fn token_set_from(access: String, refresh: Option<String>, expires_in: Option<u64>) -> TokenSet {
    let mut tokens = TokenSet::new(access, refresh);
    if let Some(secs) = expires_in {
        tokens.expires_at = Some(Utc::now() + chrono::TimeDelta::seconds(secs as i64));
    }
    tokens
}
