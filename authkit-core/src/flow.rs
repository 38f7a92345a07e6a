//! Passwordless login flow state machine.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::AuthError;
use crate::identifier::{is_valid_verification_code, Identifier};
use crate::network::NetworkClient;
use crate::session::{Session, SessionManager};
use crate::storage::TokenStore;
use crate::token::{PasswordlessHandle, Token};

/// Where a login attempt currently stands.
///
/// There is exactly one state per controller; every transition is applied
/// under the controller's lock so observers never see a torn update.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    /// No attempt in progress.
    Idle,
    /// An identifier passed local validation and was submitted.
    Submitted {
        /// The identifier under evaluation.
        identifier: Identifier,
    },
    /// The account status lookup completed.
    StatusChecked {
        /// The identifier under evaluation.
        identifier: Identifier,
        /// Whether the identifier is available for signup (no account yet).
        available: bool,
    },
    /// A one-time code was dispatched to the user.
    CodeSent {
        /// The identifier the code was sent to.
        identifier: Identifier,
        /// Server-issued handle tying the verification to this dispatch.
        handle: PasswordlessHandle,
    },
    /// A code is being verified against the server.
    Verifying {
        /// The identifier under verification.
        identifier: Identifier,
        /// The handle the code is verified against.
        handle: PasswordlessHandle,
    },
    /// Verification succeeded and a session was installed.
    Verified {
        /// Subject identifier of the new session.
        user_id: String,
    },
    /// The attempt failed.
    Failed {
        /// What went wrong; drives the caller's dialog-versus-inline choice.
        error: AuthError,
    },
}

/// Whether the product is running the passwordless flow or only using the
/// account-status lookup to route into a password flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMode {
    /// One-time codes over email or SMS.
    Passwordless,
    /// Status lookup only; the caller handles credentials elsewhere.
    Password,
}

/// Which branch a password-mode submission resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// No account exists for the identifier.
    SignUp,
    /// An account exists; proceed to login.
    Login,
}

/// What a successful [`PasswordlessFlowController::submit`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A one-time code was dispatched; the flow moved to
    /// [`FlowState::CodeSent`].
    CodeSent,
    /// Password mode resolved a branch for the caller; the flow stays in
    /// [`FlowState::StatusChecked`].
    FlowSelected(FlowKind),
}

/// Static configuration for a login flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// OAuth client identifier sent with every request.
    pub client_id: String,
    /// BCP 47 locale for user-facing messages sent by the server.
    pub locale: String,
    /// Whether identifiers without an account may sign up.
    pub signup_allowed: bool,
    /// Passwordless or password-routing behavior.
    pub mode: FlowMode,
}

/// Drives a login attempt from identifier submission to an installed
/// session.
///
/// The controller owns the [`FlowState`] and is the sole writer of the
/// persisted passwordless handle and connection keys. Sessions are only
/// ever created through the injected [`SessionManager`].
pub struct PasswordlessFlowController {
    client: Arc<dyn NetworkClient>,
    store: Arc<TokenStore>,
    sessions: Arc<SessionManager>,
    config: FlowConfig,
    state: Mutex<FlowState>,
}

/// Races `operation` against cancellation; `None` means cancelled.
async fn raced<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = operation => Some(result),
    }
}

impl PasswordlessFlowController {
    /// Creates a controller in [`FlowState::Idle`].
    #[must_use]
    pub fn new(
        client: Arc<dyn NetworkClient>,
        store: Arc<TokenStore>,
        sessions: Arc<SessionManager>,
        config: FlowConfig,
    ) -> Self {
        Self {
            client,
            store,
            sessions,
            config,
            state: Mutex::new(FlowState::Idle),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current flow state, for UI observers.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.lock().clone()
    }

    fn set_state(&self, next: FlowState) {
        *self.lock() = next;
    }

    fn fail(&self, error: AuthError) -> AuthError {
        self.set_state(FlowState::Failed {
            error: error.clone(),
        });
        error
    }

    /// Installs `token` through the session manager. A failed commit is
    /// downgraded to a warning as long as an in-memory session exists.
    fn commit_session(&self, token: Token, keep_session: bool) -> Result<Session, AuthError> {
        if !keep_session {
            return Ok(self.sessions.install_ephemeral(token));
        }
        match self.sessions.install(token) {
            Ok(session) => Ok(session),
            Err(err) => {
                tracing::warn!(%err, "session installed without durability");
                self.sessions.current().ok_or(AuthError::Storage {
                    error: err.to_string(),
                })
            }
        }
    }

    /// Submits an identifier: validates it locally, checks its account
    /// status and, in passwordless mode, dispatches a one-time code.
    ///
    /// Local validation failures never reach the network. When the
    /// identifier has no account and signup is not allowed, the flow fails
    /// with [`AuthError::SignupForbidden`] and no code is dispatched.
    ///
    /// # Errors
    ///
    /// Validation, network and business-rule failures, or
    /// [`AuthError::Cancelled`] if `cancel` fired first. On cancellation
    /// the state reverts to what it was before the call.
    pub async fn submit(
        &self,
        identifier: Identifier,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, AuthError> {
        if let Err(error) = identifier.validate() {
            return Err(self.fail(error));
        }

        let previous = self.state();
        self.set_state(FlowState::Submitted {
            identifier: identifier.clone(),
        });

        let Some(status) = raced(cancel, self.client.check_account_status(&identifier)).await
        else {
            self.set_state(previous);
            return Err(AuthError::Cancelled);
        };
        let status = match status {
            Ok(status) => status,
            Err(err) => return Err(self.fail(err.into())),
        };

        self.set_state(FlowState::StatusChecked {
            identifier: identifier.clone(),
            available: status.available,
        });

        if status.available && !self.config.signup_allowed {
            return Err(self.fail(AuthError::SignupForbidden));
        }

        if self.config.mode == FlowMode::Password {
            let kind = if status.available {
                FlowKind::SignUp
            } else {
                FlowKind::Login
            };
            return Ok(SubmitOutcome::FlowSelected(kind));
        }

        let connection = identifier.connection();
        let dispatch = self.client.request_code(
            &self.config.client_id,
            &identifier,
            connection,
            &self.config.locale,
        );
        let Some(handle) = raced(cancel, dispatch).await else {
            self.set_state(previous);
            return Err(AuthError::Cancelled);
        };
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(err.into())),
        };

        // Persist so a resend survives a restart. Losing durability is not
        // worth failing a flow that otherwise succeeded.
        if let Err(err) = self.store.write_passwordless_handle(Some(&handle)) {
            tracing::warn!(%err, "failed to persist passwordless handle");
        }
        if let Err(err) = self.store.write_last_connection(Some(connection)) {
            tracing::warn!(%err, "failed to persist connection type");
        }

        self.set_state(FlowState::CodeSent { identifier, handle });
        Ok(SubmitOutcome::CodeSent)
    }

    /// Requests a fresh one-time code for the in-flight attempt.
    ///
    /// Uses the handle from the current [`FlowState::CodeSent`] state, or
    /// the persisted handle when the process restarted or the last
    /// verification failed. The replacement handle supersedes the old one;
    /// no new flow state is created.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidState`] when no dispatch handle exists, network
    /// failures, or [`AuthError::Cancelled`].
    pub async fn resend(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let current = self.state();
        let handle = match &current {
            FlowState::CodeSent { handle, .. } => handle.clone(),
            _ => self
                .store
                .read_passwordless_handle()
                .ok_or_else(|| AuthError::InvalidState {
                    reason: "no code has been dispatched".to_string(),
                })?,
        };

        let Some(replacement) =
            raced(cancel, self.client.resend_code(&self.config.client_id, &handle)).await
        else {
            return Err(AuthError::Cancelled);
        };
        let replacement = replacement.map_err(AuthError::from)?;

        if let Err(err) = self.store.write_passwordless_handle(Some(&replacement)) {
            tracing::warn!(%err, "failed to persist replacement handle");
        }
        if let FlowState::CodeSent { identifier, .. } = current {
            self.set_state(FlowState::CodeSent {
                identifier,
                handle: replacement,
            });
        }
        Ok(())
    }

    /// Verifies a one-time code and installs the resulting session.
    ///
    /// The code is checked locally (exactly six digits) before any network
    /// call. On success the token is committed through the session manager
    /// (`keep_session = false` keeps it in memory only) and the flow ends
    /// in [`FlowState::Verified`]. On a failed verification the persisted
    /// handle survives, so [`PasswordlessFlowController::resend`] remains
    /// usable.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidVerificationCode`] for a locally rejected code
    /// (state unchanged), [`AuthError::InvalidState`] when no code was
    /// dispatched, network failures, or [`AuthError::Cancelled`] (state
    /// reverts to [`FlowState::CodeSent`]; no session is installed).
    pub async fn verify(
        &self,
        code: &str,
        keep_session: bool,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        if !is_valid_verification_code(code) {
            return Err(AuthError::InvalidVerificationCode);
        }

        let (identifier, handle) = match self.state() {
            FlowState::CodeSent { identifier, handle } => (identifier, handle),
            other => {
                return Err(AuthError::InvalidState {
                    reason: format!("cannot verify from state {other:?}"),
                })
            }
        };

        self.set_state(FlowState::Verifying {
            identifier: identifier.clone(),
            handle: handle.clone(),
        });

        let verification = self.client.verify_code(
            &self.config.client_id,
            &identifier,
            code.trim(),
            &handle,
        );
        let Some(token) = raced(cancel, verification).await else {
            // A token the server may have minted is dropped, never applied.
            self.set_state(FlowState::CodeSent { identifier, handle });
            return Err(AuthError::Cancelled);
        };
        let token = match token {
            Ok(token) => token,
            Err(err) => return Err(self.fail(err.into())),
        };

        let session = match self.commit_session(token, keep_session) {
            Ok(session) => session,
            Err(err) => return Err(self.fail(err)),
        };

        if let Err(err) = self.store.write_passwordless_handle(None) {
            tracing::warn!(%err, "failed to clear passwordless handle");
        }
        self.set_state(FlowState::Verified {
            user_id: session.user_id().to_string(),
        });
        Ok(session)
    }

    /// Logs in with an externally obtained authorization code, bypassing
    /// the code-dispatch states entirely.
    ///
    /// The code is persisted before the exchange so a crash mid-login can
    /// be diagnosed against the last code seen, and retired once the
    /// session is installed.
    ///
    /// # Errors
    ///
    /// Network failures or [`AuthError::Cancelled`]; on either, no session
    /// is installed and the flow state is unchanged.
    pub async fn login_with_auth_code(
        &self,
        auth_code: &str,
        keep_session: bool,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        if let Err(err) = self.store.write_last_auth_code(Some(auth_code)) {
            tracing::warn!(%err, "failed to persist auth code");
        }

        let exchange = self
            .client
            .exchange_token(&self.config.client_id, auth_code);
        let Some(token) = raced(cancel, exchange).await else {
            return Err(AuthError::Cancelled);
        };
        let token = match token {
            Ok(token) => token,
            Err(err) => return Err(self.fail(err.into())),
        };

        let session = match self.commit_session(token, keep_session) {
            Ok(session) => session,
            Err(err) => return Err(self.fail(err)),
        };

        if let Err(err) = self.store.write_last_auth_code(None) {
            tracing::warn!(%err, "failed to clear auth code");
        }
        self.set_state(FlowState::Verified {
            user_id: session.user_id().to_string(),
        });
        Ok(session)
    }

    /// Abandons the current attempt and starts over with `identifier`.
    ///
    /// Clears the flow state and the persisted dispatch keys, then submits
    /// the new identifier.
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlowController::submit`].
    pub async fn reset(
        &self,
        identifier: Identifier,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, AuthError> {
        self.set_state(FlowState::Idle);
        if let Err(err) = self.store.write_passwordless_handle(None) {
            tracing::warn!(%err, "failed to clear passwordless handle");
        }
        if let Err(err) = self.store.write_last_connection(None) {
            tracing::warn!(%err, "failed to clear connection type");
        }
        self.submit(identifier, cancel).await
    }
}
