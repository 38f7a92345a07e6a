//! The single authoritative session.

use std::sync::{Arc, Mutex, PoisonError};

use authkit_store::StorageResult;
use secrecy::SecretString;

use crate::events::{EventBus, SessionEvent};
use crate::storage::TokenStore;
use crate::token::Token;

/// The currently authenticated subject and the token backing it.
///
/// Only [`SessionManager`] constructs sessions; everything else observes
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
    token: Token,
    persistent: bool,
}

impl Session {
    fn new(token: Token, persistent: bool) -> Self {
        Self {
            user_id: token.user_id.clone(),
            token,
            persistent,
        }
    }

    /// Subject identifier of the logged-in user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The token backing this session.
    #[must_use]
    pub const fn token(&self) -> &Token {
        &self.token
    }

    /// Whether this session was committed to storage (false for sessions
    /// installed with `keep_session = false`).
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }
}

/// Single source of truth for "who is logged in".
///
/// Owns the in-memory [`Session`], resumes it from the [`TokenStore`] at
/// startup, and publishes lifecycle events on the [`EventBus`]. It is the
/// sole writer of the token keys in storage.
pub struct SessionManager {
    store: Arc<TokenStore>,
    events: Arc<EventBus>,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    /// Creates a manager with no active session.
    #[must_use]
    pub fn new(store: Arc<TokenStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            events,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resumes a previously persisted session, trying the current storage
    /// schema first and successively older schemes (the legacy-encrypted
    /// variant only when `legacy_secret` is supplied).
    ///
    /// A stored token that is absent, structurally invalid or expired at
    /// `now` yields `None`. Stored state is never mutated here — an expired
    /// token stays on disk, since an external refresh flow may still redeem
    /// it; eviction happens only on explicit logout.
    pub fn resume(&self, legacy_secret: Option<&SecretString>, now: u64) -> Option<Session> {
        let token = self.store.read_token_compat(legacy_secret)?;
        if !token.is_valid(now) {
            tracing::debug!(
                user_id = %token.user_id,
                expires_at = token.expires_at,
                "stored token is expired, not resuming"
            );
            return None;
        }
        let session = Session::new(token, true);
        *self.lock() = Some(session.clone());
        tracing::info!(user_id = %session.user_id, "session resumed");
        Some(session)
    }

    /// Commits `token` to storage, installs it as the active session and
    /// publishes [`SessionEvent::SessionChanged`].
    ///
    /// # Errors
    ///
    /// Returns the storage error if the commit failed. The session is still
    /// installed in memory and the event is still published, so the current
    /// process remains usable; only durability was lost.
    pub fn install(&self, token: Token) -> StorageResult<Session> {
        let write_result = self.store.write_token(Some(&token));
        if let Err(err) = &write_result {
            tracing::error!(%err, "failed to persist session token");
        }
        let session = Session::new(token.clone(), true);
        *self.lock() = Some(session.clone());
        self.events.publish(&SessionEvent::SessionChanged { token });
        write_result.map(|()| session)
    }

    /// Installs `token` as the active session in memory only, without
    /// touching storage. Used when the user opted out of being remembered.
    pub fn install_ephemeral(&self, token: Token) -> Session {
        let session = Session::new(token.clone(), false);
        *self.lock() = Some(session.clone());
        self.events.publish(&SessionEvent::SessionChanged { token });
        session
    }

    /// Replaces the active session's token after a refresh, committing it
    /// and publishing [`SessionEvent::TokenRefreshed`].
    ///
    /// # Errors
    ///
    /// Returns the storage error if the commit failed; as with
    /// [`SessionManager::install`], the in-memory session is updated
    /// regardless.
    pub fn refresh(&self, token: Token) -> StorageResult<Session> {
        let write_result = self.store.write_token(Some(&token));
        if let Err(err) = &write_result {
            tracing::error!(%err, "failed to persist refreshed token");
        }
        let user_id = token.user_id.clone();
        let session = Session::new(token, true);
        *self.lock() = Some(session.clone());
        self.events
            .publish(&SessionEvent::TokenRefreshed { user_id });
        write_result.map(|()| session)
    }

    /// Tears down the session: clears the in-memory state, wipes every
    /// stored key (all token variants, the passwordless handle, the legacy
    /// namespace) and publishes [`SessionEvent::LoggedOut`].
    ///
    /// The event is published even when the underlying clear partially
    /// fails — observers must not be left believing the user is still
    /// logged in.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered while clearing.
    pub fn logout(&self) -> StorageResult<()> {
        let user_id = self
            .lock()
            .take()
            .map(|session| session.user_id)
            .unwrap_or_default();

        let result = self
            .store
            .clear_token()
            .and_then(|()| self.store.clear_all());
        if let Err(err) = &result {
            tracing::error!(%err, "failed to clear stored credentials on logout");
        }

        self.events.publish(&SessionEvent::LoggedOut { user_id });
        result
    }

    /// The active session, if any. Never triggers I/O.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.lock().clone()
    }
}
