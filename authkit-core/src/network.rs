//! The network client interface the flow controller is written against.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::error::AuthError;
use crate::identifier::{ConnectionType, Identifier};
use crate::token::{PasswordlessHandle, Token};

/// Account status for an identifier, as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AccountStatus {
    /// Whether an account already exists for the identifier.
    pub exists: bool,
    /// Whether the identifier is available for signup.
    pub available: bool,
    /// Whether the existing account has a verified identifier.
    #[serde(default)]
    pub verified: bool,
}

/// Failure reported by a network client implementation.
///
/// Transport failures and endpoint failures are kept apart so the flow
/// controller can map them onto the caller-facing error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (connectivity, timeout).
    #[error("network error: {error}")]
    Network {
        /// Description of the transport failure.
        error: String,
    },
    /// The endpoint responded with a failure status.
    #[error("server responded with {status}: {error}")]
    Server {
        /// HTTP status code of the response.
        status: u16,
        /// Response body or failure description.
        error: String,
    },
}

impl From<ApiError> for AuthError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Network { error } => Self::NetworkError { error },
            ApiError::Server { status, error } => Self::ServerError {
                code: status,
                error,
            },
        }
    }
}

/// Opaque network client for the passwordless protocol endpoints.
///
/// Implementations own transport concerns entirely: marshalling, TLS,
/// timeouts and retry/backoff policy. The flow controller only sees typed
/// results or an [`ApiError`].
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Looks up the account status of `identifier`.
    async fn check_account_status(
        &self,
        identifier: &Identifier,
    ) -> Result<AccountStatus, ApiError>;

    /// Dispatches a one-time code to `identifier`, returning the handle that
    /// correlates the later resend/verify calls.
    async fn request_code(
        &self,
        client_id: &str,
        identifier: &Identifier,
        connection: ConnectionType,
        locale: &str,
    ) -> Result<PasswordlessHandle, ApiError>;

    /// Re-dispatches the code for a previously issued handle. The endpoint
    /// returns a replacement handle.
    async fn resend_code(
        &self,
        client_id: &str,
        handle: &PasswordlessHandle,
    ) -> Result<PasswordlessHandle, ApiError>;

    /// Exchanges an identifier, code and handle for a token.
    async fn verify_code(
        &self,
        client_id: &str,
        identifier: &Identifier,
        code: &str,
        handle: &PasswordlessHandle,
    ) -> Result<Token, ApiError>;

    /// Exchanges an authorization code for a token.
    async fn exchange_token(&self, client_id: &str, auth_code: &str) -> Result<Token, ApiError>;
}
