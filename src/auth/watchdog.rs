//! Session expiry watchdog.
//!
//! A periodic task that keeps the access token fresh independently of user
//! activity: inside the refresh window it refreshes proactively; when the
//! refresh token itself is rejected it clears both storage areas and
//! reports the session as signed out so owners can shut down.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::errors::{ApiError, AuthError};

/// Health of the signed-in session, published over a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHealth {
    Active,
    SignedOut,
}

/// Run the expiry watchdog until the session dies or all receivers hang up.
///
/// Transport failures are tolerated (the next tick retries); a rejected
/// refresh is terminal. The caller spawns this and watches `health` for
/// [`SessionHealth::SignedOut`].
pub async fn run_watchdog(
    api: ApiClient,
    interval: Duration,
    refresh_window: Duration,
    health: watch::Sender<SessionHealth>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately; consume it so sign-in state settles
    // before the first real check.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = health.closed() => {
                debug!("watchdog: all listeners gone, stopping");
                return;
            }
        }

        let tokens = match api.vault().load() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                let _ = health.send(SessionHealth::SignedOut);
                return;
            }
            Err(e) => {
                warn!("watchdog: token store unreadable: {e}");
                continue;
            }
        };

        if !tokens.is_expired() && !tokens.expires_within(refresh_window) {
            continue;
        }

        debug!("watchdog: access token inside refresh window, refreshing");
        match api.refresh().await {
            Ok(_) => {}
            Err(ApiError::Auth(AuthError::RefreshRejected(reason))) => {
                warn!("watchdog: refresh rejected ({reason}), signing out");
                if let Err(e) = api.vault().clear() {
                    warn!("watchdog: failed to clear token stores: {e}");
                }
                let _ = health.send(SessionHealth::SignedOut);
                return;
            }
            Err(ApiError::Auth(AuthError::NotSignedIn | AuthError::SessionExpired)) => {
                let _ = health.send(SessionHealth::SignedOut);
                return;
            }
            Err(e) => {
                // Network trouble: the token may still be honored, retry
                // on the next tick rather than dropping the session.
                warn!("watchdog: refresh attempt failed: {e}");
            }
        }
    }
}
