//! Auth session state.
//!
//! Token and user live in ONE persisted record so a partial write can never
//! leave them out of sync. Invariant: no token means unauthenticated, whatever
//! else is in storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use sv_api_types::{ApiError, OutboundMessage, User};
use sv_storage::{KeyValueStore, keys};
use tracing::{debug, info, warn};

const ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl AuthSession {
    fn is_valid(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

/// Fetches the user behind a bearer token (`GET /v1/auth/me` in the browser).
#[async_trait(?Send)]
pub trait ProfileApi {
    async fn current_user(&self, bearer: &str) -> Result<User, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    NoSession,
    Refreshed,
    Invalidated,
    /// Network or server trouble; the session was kept as-is.
    Kept,
}

pub struct SessionManager {
    store: Rc<dyn KeyValueStore>,
    current: RefCell<Option<AuthSession>>,
}

impl SessionManager {
    pub fn new(store: Rc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RefCell::new(None),
        }
    }

    /// Load the persisted session, migrating the legacy token/user key pair.
    pub fn restore(&self) -> Option<AuthSession> {
        let stored = sv_storage::soft_read_json::<AuthSession>(self.store.as_ref(), keys::AUTH_SESSION)
            .filter(AuthSession::is_valid);

        let session = match stored {
            Some(session) => Some(session),
            None => self.migrate_legacy(),
        };

        if let Some(session) = &session {
            info!(has_user = session.user.is_some(), "auth session restored");
        }
        *self.current.borrow_mut() = session.clone();
        session
    }

    fn migrate_legacy(&self) -> Option<AuthSession> {
        let store = self.store.as_ref();
        let token = sv_storage::soft_get(store, keys::LEGACY_AUTH_TOKEN);
        let user = sv_storage::soft_read_json::<User>(store, keys::LEGACY_AUTH_USER);
        if token.is_none() && user.is_none() {
            return None;
        }

        sv_storage::soft_remove(store, keys::LEGACY_AUTH_TOKEN);
        sv_storage::soft_remove(store, keys::LEGACY_AUTH_USER);

        let session = AuthSession {
            token: token?.trim().to_owned(),
            user,
        };
        if !session.is_valid() {
            debug!("discarding legacy user record without a token");
            return None;
        }
        self.persist(&session);
        Some(session)
    }

    fn persist(&self, session: &AuthSession) {
        sv_storage::soft_write_json(self.store.as_ref(), keys::AUTH_SESSION, session);
    }

    pub fn login(&self, token: &str, user: User) {
        self.replace(token, Some(user));
    }

    /// Accept a token from the native host or a deep link. The previous user
    /// record survives only when the token is unchanged.
    pub fn set_token(&self, token: &str, user: Option<User>) {
        let token = token.trim();
        let user = user.or_else(|| {
            self.current
                .borrow()
                .as_ref()
                .filter(|s| s.token == token)
                .and_then(|s| s.user.clone())
        });
        self.replace(token, user);
    }

    fn replace(&self, token: &str, user: Option<User>) {
        let session = AuthSession {
            token: token.trim().to_owned(),
            user,
        };
        if !session.is_valid() {
            warn!("refusing to store an empty auth token");
            return;
        }
        self.persist(&session);
        *self.current.borrow_mut() = Some(session);
    }

    pub fn update_user(&self, user: User) {
        let mut current = self.current.borrow_mut();
        let Some(session) = current.as_mut() else {
            debug!("ignoring user update without a session");
            return;
        };
        session.user = Some(user);
        self.persist(session);
    }

    pub fn logout(&self) {
        let store = self.store.as_ref();
        sv_storage::soft_remove(store, keys::AUTH_SESSION);
        sv_storage::soft_remove(store, keys::LEGACY_AUTH_TOKEN);
        sv_storage::soft_remove(store, keys::LEGACY_AUTH_USER);
        sv_storage::soft_remove(store, keys::VERIFICATION_DISMISSED_UNTIL);
        *self.current.borrow_mut() = None;
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.current.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.current.borrow().as_ref().and_then(|s| s.user.clone())
    }

    pub fn bearer(&self) -> Option<String> {
        self.token().map(|token| format!("Bearer {token}"))
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user()
            .is_some_and(|u| ADMIN_ROLES.contains(&u.role.to_ascii_lowercase().as_str()))
    }

    pub fn is_email_verified(&self) -> bool {
        self.user().is_some_and(|u| u.email_verified_at.is_some())
    }

    pub fn auth_state_message(&self) -> OutboundMessage {
        OutboundMessage::AuthStateChange {
            is_authenticated: self.is_authenticated(),
            user: self.user(),
        }
    }

    // ── Email verification prompt snooze ──

    pub fn dismiss_verification_for(&self, now_ms: u64, duration_ms: u64) {
        let until = now_ms.saturating_add(duration_ms);
        sv_storage::soft_set(
            self.store.as_ref(),
            keys::VERIFICATION_DISMISSED_UNTIL,
            &until.to_string(),
        );
    }

    pub fn verification_prompt_due(&self, now_ms: u64) -> bool {
        if !self.is_authenticated() || self.is_email_verified() {
            return false;
        }
        let until = sv_storage::soft_get(self.store.as_ref(), keys::VERIFICATION_DISMISSED_UNTIL)
            .and_then(|raw| raw.trim().parse::<u64>().ok());
        until.is_none_or(|until| now_ms >= until)
    }

    /// Re-check the stored token against the API. Only a definite
    /// unauthorized answer ends the session.
    pub async fn revalidate(&self, api: &dyn ProfileApi) -> Revalidation {
        let Some(token) = self.token() else {
            return Revalidation::NoSession;
        };

        let result = api.current_user(&format!("Bearer {token}")).await;

        // The session may have changed while the request was in flight.
        if self.token().as_deref() != Some(token.as_str()) {
            debug!("session changed during revalidation; ignoring result");
            return Revalidation::Kept;
        }

        match result {
            Ok(user) => {
                self.update_user(user);
                Revalidation::Refreshed
            }
            Err(err) if err.is_unauthorized() => {
                info!("stored token rejected; logging out");
                self.logout();
                Revalidation::Invalidated
            }
            Err(err) => {
                warn!("session revalidation failed: {err}");
                Revalidation::Kept
            }
        }
    }
}
