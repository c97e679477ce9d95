//! The 401 contract of the authenticated request wrapper: exactly one
//! refresh-and-retry, rotation persisted to both stores, repeated failures
//! propagated.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use tokio::net::TcpListener;

use atrium::api::ApiClient;
use atrium::auth::{TokenSet, TokenVault};
use atrium::errors::{ApiError, AuthError};

// ── Mock server ──────────────────────────────────────────────────────

struct ServerState {
    /// Bearer value `/api/users/me` accepts; anything else is a 401.
    accepted_token: &'static str,
    refresh_calls: AtomicU32,
    me_calls: AtomicU32,
}

async fn start_server(accepted_token: &'static str) -> (SocketAddr, Arc<ServerState>) {
    let state = Arc::new(ServerState {
        accepted_token,
        refresh_calls: AtomicU32::new(0),
        me_calls: AtomicU32::new(0),
    });

    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/users/me", get(me))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn login(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    if body["email"] == "user@example.com" && body["password"] == "hunter2" {
        Json(serde_json::json!({
            "access": "tok-fresh",
            "refresh": "ref-1",
            "expires_in": 3600,
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "bad credentials"})),
        )
            .into_response()
    }
}

async fn refresh(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if body["refresh"] == "ref-1" {
        Json(serde_json::json!({"access": "tok-fresh", "expires_in": 3600})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unknown refresh token"})),
        )
            .into_response()
    }
}

async fn me(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> impl IntoResponse {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", state.accepted_token));
    if authorized {
        Json(serde_json::json!({
            "id": "u-1",
            "email": "user@example.com",
            "name": "Test User",
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "token invalid"})),
        )
            .into_response()
    }
}

fn client(addr: SocketAddr, dir: &tempfile::TempDir) -> ApiClient {
    let vault = TokenVault::new(dir.path().join("tokens.json"));
    ApiClient::new(format!("http://{addr}"), vault)
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_stores_tokens_and_fetches_profile() {
    let (addr, _state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);

    let profile = api.login("user@example.com", "hunter2").await.unwrap();
    assert_eq!(profile.email, "user@example.com");
    assert_eq!(profile.name.as_deref(), Some("Test User"));

    let stored = api.vault().require().unwrap();
    assert_eq!(stored.access, "tok-fresh");
    assert_eq!(stored.refresh.as_deref(), Some("ref-1"));
    assert!(stored.expires_at.is_some());

    // Durable copy exists for the next process
    assert!(dir.path().join("tokens.json").exists());
}

#[tokio::test]
async fn login_rejection_surfaces_as_auth_error() {
    let (addr, _state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);

    let err = api.login("user@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(AuthError::LoginRejected(_))));
    assert!(matches!(
        api.vault().require(),
        Err(AuthError::NotSignedIn)
    ));
}

#[tokio::test]
async fn stale_token_triggers_exactly_one_refresh_and_retry() {
    let (addr, state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);
    api.vault()
        .store(&TokenSet::new("tok-stale", Some("ref-1".into())))
        .unwrap();

    let profile = api.me().await.unwrap();
    assert_eq!(profile.id, "u-1");

    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
    // First call 401s, the retry succeeds
    assert_eq!(state.me_calls.load(Ordering::SeqCst), 2);
    // The rotated token is what got persisted
    assert_eq!(api.vault().require().unwrap().access, "tok-fresh");
}

#[tokio::test]
async fn rejected_refresh_propagates_without_looping() {
    let (addr, state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);
    api.vault()
        .store(&TokenSet::new("tok-stale", Some("ref-unknown".into())))
        .unwrap();

    let err = api.me().await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Auth(AuthError::RefreshRejected(_))
    ));
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.me_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_401_after_refresh_propagates_status() {
    // The server never accepts any bearer, so even the refreshed token
    // 401s; the wrapper must not refresh twice.
    let (addr, state) = start_server("tok-never").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);
    api.vault()
        .store(&TokenSet::new("tok-stale", Some("ref-1".into())))
        .unwrap();

    let err = api.me().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 401, .. }));
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.me_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn watchdog_refreshes_token_inside_window() {
    use atrium::auth::{SessionHealth, run_watchdog};
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;
    use tokio::sync::watch;

    let (addr, state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);
    api.vault()
        .store(
            &TokenSet::new("tok-stale", Some("ref-1".into()))
                .with_expiry(Utc::now() + TimeDelta::seconds(30)),
        )
        .unwrap();

    let (health_tx, health_rx) = watch::channel(SessionHealth::Active);
    let task = tokio::spawn(run_watchdog(
        api.clone(),
        Duration::from_millis(20),
        Duration::from_secs(300),
        health_tx,
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.refresh_calls.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "watchdog never refreshed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(*health_rx.borrow(), SessionHealth::Active);
    assert_eq!(api.vault().require().unwrap().access, "tok-fresh");

    // Dropping the last listener stops the watchdog
    drop(health_rx);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watchdog should stop once listeners are gone")
        .unwrap();
}

#[tokio::test]
async fn watchdog_signs_out_when_refresh_is_rejected() {
    use atrium::auth::{SessionHealth, run_watchdog};
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;
    use tokio::sync::watch;

    let (addr, _state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);
    api.vault()
        .store(
            &TokenSet::new("tok-stale", Some("ref-unknown".into()))
                .with_expiry(Utc::now() - TimeDelta::seconds(1)),
        )
        .unwrap();

    let (health_tx, mut health_rx) = watch::channel(SessionHealth::Active);
    let task = tokio::spawn(run_watchdog(
        api.clone(),
        Duration::from_millis(20),
        Duration::from_secs(300),
        health_tx,
    ));

    tokio::time::timeout(Duration::from_secs(5), health_rx.changed())
        .await
        .expect("watchdog should report within the timeout")
        .unwrap();
    assert_eq!(*health_rx.borrow(), SessionHealth::SignedOut);

    // Both storage areas are cleared on forced sign-out
    assert!(matches!(
        api.vault().require(),
        Err(AuthError::NotSignedIn)
    ));
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn missing_refresh_token_is_session_expiry() {
    let (addr, state) = start_server("tok-fresh").await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(addr, &dir);
    api.vault()
        .store(&TokenSet::new("tok-stale", None))
        .unwrap();

    let err = api.me().await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Auth(AuthError::SessionExpired)
    ));
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 0);
}
