//! Bearer tokens and the passwordless correlation handle.

use serde::{Deserialize, Serialize};

/// A bearer credential issued by the token endpoint.
///
/// A token is *valid* iff it is structurally sound and its expiry timestamp
/// is strictly in the future relative to evaluation time. Expiry is an
/// absolute unix timestamp in seconds; clients converting from a relative
/// `expires_in` do so at receipt time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The access token value.
    pub access_token: String,
    /// Refresh token, when the grant issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Subject (user) identifier the token was issued for.
    pub user_id: String,
    /// Absolute expiry, unix seconds.
    pub expires_at: u64,
    /// Granted scopes, space-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Token type as reported by the endpoint, typically `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Token {
    /// Whether the required fields are present and non-empty. Structural
    /// validity says nothing about expiry.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.user_id.is_empty()
    }

    /// Whether the token is usable at `now` (unix seconds): structurally
    /// valid and not yet expired. Expiry is strict; a token expiring exactly
    /// at `now` is invalid.
    #[must_use]
    pub fn is_valid(&self, now: u64) -> bool {
        self.is_structurally_valid() && self.expires_at > now
    }

    /// The `Authorization` header value for this token.
    #[must_use]
    pub fn bearer_auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Opaque server-issued handle correlating a sent verification code with a
/// subsequent resend or verify call.
///
/// Immutable once issued; persisted so a resend can survive a process
/// restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordlessHandle {
    /// The raw handle value as issued by the code-dispatch endpoint.
    #[serde(rename = "passwordless_token")]
    pub value: String,
}

impl PasswordlessHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}
