// ABOUTME: Cookie-backed browser sessions carrying the pending authorization request
// ABOUTME: Session state lives server side in the grant store; the cookie holds only an id
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Browser sessions
//!
//! The authorize endpoint parks the validated authorization request in the
//! session while the user authenticates, then the login handler picks it
//! back up. The cookie carries only a random session id; all state stays
//! in the server-side store and expires with it.

use crate::errors::AppResult;
use crate::keys::random_hex;
use crate::oidc::models::AuthorizationRequest;
use crate::store::{StoreConfig, TtlStore};
use chrono::{Duration, Utc};
use uuid::Uuid;

/// Session cookie name
pub const SESSION_COOKIE: &str = "oidc_session";

/// Session id entropy in bytes (hex doubles the length on the wire)
const SESSION_ID_BYTES: usize = 32;

/// Per-browser session state
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Authorization request awaiting user authentication
    pub pending_request: Option<AuthorizationRequest>,
    /// Authenticated user, once login succeeds
    pub user_id: Option<Uuid>,
}

/// Session manager over the TTL grant store
#[derive(Clone)]
pub struct SessionManager {
    sessions: TtlStore<SessionData>,
    ttl_secs: i64,
}

impl SessionManager {
    /// Create a session manager with the given session lifetime
    #[must_use]
    pub fn new(store_config: &StoreConfig, ttl_secs: i64) -> Self {
        Self {
            sessions: TtlStore::new(store_config),
            ttl_secs,
        }
    }

    /// Load the session referenced by a Cookie header, or start a fresh one
    ///
    /// Returns the session id and its data. An absent, unknown, or expired
    /// cookie yields a new empty session; the caller persists it with
    /// [`Self::save`].
    ///
    /// # Errors
    /// Returns an error if the RNG fails while minting a new session id
    pub async fn load(&self, cookie_header: Option<&str>) -> AppResult<(String, SessionData)> {
        if let Some(session_id) = cookie_header.and_then(extract_session_id) {
            if let Some(data) = self.sessions.peek(&session_id).await {
                return Ok((session_id, data));
            }
        }

        let session_id = random_hex(SESSION_ID_BYTES)?;
        Ok((session_id, SessionData::default()))
    }

    /// Persist session data, refreshing its expiry
    pub async fn save(&self, session_id: &str, data: SessionData) {
        let expires_at = Utc::now() + Duration::seconds(self.ttl_secs);
        self.sessions.put(session_id, data, expires_at).await;
    }

    /// Set-Cookie value binding this session to the browser
    #[must_use]
    pub fn cookie_value(&self, session_id: &str) -> String {
        format!(
            "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl_secs
        )
    }
}

/// Extract the session id from a Cookie header value
fn extract_session_id(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .map(ToOwned::to_owned)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> SessionManager {
        SessionManager::new(
            &StoreConfig {
                enable_background_cleanup: false,
                ..StoreConfig::default()
            },
            3600,
        )
    }

    #[test]
    fn extracts_session_id_among_other_cookies() {
        let header = "theme=dark; oidc_session=abc123; lang=en";
        assert_eq!(extract_session_id(header).as_deref(), Some("abc123"));
        assert_eq!(extract_session_id("theme=dark"), None);
        assert_eq!(extract_session_id("oidc_session="), None);
    }

    #[tokio::test]
    async fn missing_cookie_starts_fresh_session() {
        let manager = test_manager();
        let (session_id, data) = manager.load(None).await.unwrap();

        assert_eq!(session_id.len(), SESSION_ID_BYTES * 2);
        assert!(data.pending_request.is_none());
        assert!(data.user_id.is_none());
    }

    #[tokio::test]
    async fn saved_session_round_trips_through_cookie() {
        let manager = test_manager();
        let (session_id, mut data) = manager.load(None).await.unwrap();

        data.user_id = Some(Uuid::new_v4());
        manager.save(&session_id, data.clone()).await;

        let header = format!("{SESSION_COOKIE}={session_id}");
        let (loaded_id, loaded) = manager.load(Some(&header)).await.unwrap();

        assert_eq!(loaded_id, session_id);
        assert_eq!(loaded.user_id, data.user_id);
    }

    #[tokio::test]
    async fn unknown_cookie_gets_a_new_id() {
        let manager = test_manager();
        let header = format!("{SESSION_COOKIE}=deadbeef");
        let (session_id, _) = manager.load(Some(&header)).await.unwrap();

        assert_ne!(session_id, "deadbeef");
    }

    #[test]
    fn cookie_value_is_http_only_and_lax() {
        let manager = test_manager();
        let value = manager.cookie_value("abc");

        assert!(value.starts_with("oidc_session=abc;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=3600"));
    }
}
