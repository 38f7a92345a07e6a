//! Error taxonomy for authentication flows.

use thiserror::Error;

/// Errors surfaced by the flow controller and session manager.
///
/// Input errors (`InvalidEmail`, `InvalidPhoneNumber`,
/// `InvalidVerificationCode`) are resolved locally and never reach the
/// network. Server-class errors are kept distinct because callers render
/// them differently (modal dialog vs. inline field error); see
/// [`AuthError::is_server_error`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The supplied email address is not syntactically valid.
    #[error("invalid email address")]
    InvalidEmail,

    /// The supplied phone number is not syntactically valid.
    #[error("invalid phone number")]
    InvalidPhoneNumber,

    /// The supplied verification code is not six numeric digits.
    #[error("invalid verification code")]
    InvalidVerificationCode,

    /// The identifier is available but signup is not permitted.
    #[error("signup is not allowed")]
    SignupForbidden,

    /// Transport-level failure (connectivity, timeout).
    #[error("network error: {error}")]
    NetworkError {
        /// Description of the transport failure.
        error: String,
    },

    /// The endpoint returned a failure outside input validation.
    #[error("server error ({code}): {error}")]
    ServerError {
        /// HTTP-equivalent status code reported by the endpoint.
        code: u16,
        /// Response body or failure description.
        error: String,
    },

    /// The requested operation is not valid in the current flow state.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What the operation expected and what it found.
        reason: String,
    },

    /// The in-flight operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A persistence commit failed.
    #[error("storage error: {error}")]
    Storage {
        /// Description of the failed commit.
        error: String,
    },
}

impl AuthError {
    /// Whether this error is server-class: not attributable to user input,
    /// so callers should render it as a dialog rather than an inline field
    /// error.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::ServerError { .. } | Self::Storage { .. }
        )
    }
}

impl From<authkit_store::StorageError> for AuthError {
    fn from(error: authkit_store::StorageError) -> Self {
        Self::Storage {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_classification() {
        assert!(AuthError::NetworkError {
            error: "timeout".into()
        }
        .is_server_error());
        assert!(AuthError::ServerError {
            code: 503,
            error: "unavailable".into()
        }
        .is_server_error());

        assert!(!AuthError::InvalidEmail.is_server_error());
        assert!(!AuthError::InvalidPhoneNumber.is_server_error());
        assert!(!AuthError::InvalidVerificationCode.is_server_error());
        assert!(!AuthError::SignupForbidden.is_server_error());
        assert!(!AuthError::Cancelled.is_server_error());
    }
}
