//! The token store: durable, versioned storage for session credentials and
//! the passwordless handle.

use std::sync::Arc;

use authkit_store::{KvBackend, StorageError, StorageResult};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::identifier::ConnectionType;
use crate::storage::legacy::LegacyDecrypt;
use crate::token::{PasswordlessHandle, Token};

/// Namespace holding the current storage schema.
pub const PREFERENCES_NAMESPACE: &str = "preferences";

/// Key of the current-schema token blob (variant 1).
pub const KEY_CURRENT_TOKEN: &str = "JSONWebToken";

/// Deprecated token key (variant 2). Kept for a bounded compatibility
/// window matching the lifetime of the refresh tokens issued under it;
/// read as a fallback, never written.
pub const KEY_DEPRECATED_TOKEN: &str = "RashomonJwt";

/// Key of the persisted passwordless handle.
pub const KEY_PASSWORDLESS_HANDLE: &str = "PasswordlessToken";

/// Key of the last connection type used to dispatch a code.
pub const KEY_CONNECTION: &str = "Connection";

/// Key of the last auth code handed to the SDK.
pub const KEY_AUTH_CODE: &str = "AuthCode";

/// Default name of the legacy-encrypted namespace (variant 3).
pub const DEFAULT_LEGACY_NAMESPACE: &str = "account.sdk";

const LEGACY_ACCESS_TOKEN: &str = "access_token";
const LEGACY_REFRESH_TOKEN: &str = "refresh_token";
const LEGACY_USER_ID: &str = "user_id";
const LEGACY_EXPIRES_AT: &str = "expires_at";

/// Versioned, transactional persistence for session and client credentials.
///
/// Reads degrade to "not found": a malformed or undecryptable record is
/// treated as absence, never as an error. Writes surface commit failures to
/// the caller, because a credential that silently fails to persist is lost
/// data.
pub struct TokenStore {
    backend: Arc<dyn KvBackend>,
    decryptor: Option<Arc<dyn LegacyDecrypt>>,
    legacy_namespace: String,
}

impl TokenStore {
    /// Creates a store without legacy-decryption support. Variant 3 reads
    /// will always miss; the legacy namespace is still wiped on clears.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            decryptor: None,
            legacy_namespace: DEFAULT_LEGACY_NAMESPACE.to_string(),
        }
    }

    /// Creates a store that can read the legacy-encrypted variant through
    /// `decryptor`, looking in `legacy_namespace`.
    #[must_use]
    pub fn with_legacy(
        backend: Arc<dyn KvBackend>,
        decryptor: Arc<dyn LegacyDecrypt>,
        legacy_namespace: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            decryptor: Some(decryptor),
            legacy_namespace: legacy_namespace.into(),
        }
    }

    /// Reads the current-schema token (variant 1 only). Absent or malformed
    /// records read as `None`.
    #[must_use]
    pub fn read_current_token(&self) -> Option<Token> {
        self.read_json_token(KEY_CURRENT_TOKEN)
    }

    /// Reads the stored token across schema variants: current, then
    /// deprecated, then — only when `secret` is supplied — the
    /// legacy-encrypted namespace.
    ///
    /// Returns the first structurally valid token found. Expiry is not
    /// checked here; that is the caller's responsibility.
    #[must_use]
    pub fn read_token_compat(&self, secret: Option<&SecretString>) -> Option<Token> {
        if let Some(token) = self.read_json_token(KEY_CURRENT_TOKEN) {
            return Some(token);
        }
        if let Some(token) = self.read_json_token(KEY_DEPRECATED_TOKEN) {
            return Some(token);
        }
        self.read_legacy_encrypted(secret?)
    }

    /// Serializes `token` into the current schema; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the commit fails.
    pub fn write_token(&self, token: Option<&Token>) -> StorageResult<()> {
        match token {
            Some(token) => {
                let json = serde_json::to_string(token)
                    .map_err(|err| StorageError::Serialization(err.to_string()))?;
                self.backend
                    .put(PREFERENCES_NAMESPACE, KEY_CURRENT_TOKEN, Some(&json))
            }
            None => self
                .backend
                .put(PREFERENCES_NAMESPACE, KEY_CURRENT_TOKEN, None),
        }
    }

    /// Removes the stored token in every variant: current and deprecated
    /// keys, plus the whole legacy-encrypted namespace (best-effort —
    /// absence of the legacy namespace is not an error).
    ///
    /// # Errors
    ///
    /// Returns an error if clearing the current-namespace keys fails.
    pub fn clear_token(&self) -> StorageResult<()> {
        self.backend
            .put(PREFERENCES_NAMESPACE, KEY_CURRENT_TOKEN, None)?;
        self.backend
            .put(PREFERENCES_NAMESPACE, KEY_DEPRECATED_TOKEN, None)?;
        if let Err(err) = self.backend.remove_namespace(&self.legacy_namespace) {
            tracing::warn!(%err, "failed to remove legacy credential namespace");
        }
        Ok(())
    }

    /// Reads the persisted passwordless handle, if any.
    #[must_use]
    pub fn read_passwordless_handle(&self) -> Option<PasswordlessHandle> {
        let json = self.read_string(KEY_PASSWORDLESS_HANDLE)?;
        match serde_json::from_str(&json) {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(%err, "stored passwordless handle is malformed, treating as absent");
                None
            }
        }
    }

    /// Persists the passwordless handle; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the commit fails.
    pub fn write_passwordless_handle(
        &self,
        handle: Option<&PasswordlessHandle>,
    ) -> StorageResult<()> {
        match handle {
            Some(handle) => {
                let json = serde_json::to_string(handle)
                    .map_err(|err| StorageError::Serialization(err.to_string()))?;
                self.backend
                    .put(PREFERENCES_NAMESPACE, KEY_PASSWORDLESS_HANDLE, Some(&json))
            }
            None => self
                .backend
                .put(PREFERENCES_NAMESPACE, KEY_PASSWORDLESS_HANDLE, None),
        }
    }

    /// Reads the last connection type used to dispatch a code.
    #[must_use]
    pub fn read_last_connection(&self) -> Option<ConnectionType> {
        self.read_string(KEY_CONNECTION)?.parse().ok()
    }

    /// Persists the last connection type; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn write_last_connection(&self, connection: Option<ConnectionType>) -> StorageResult<()> {
        self.backend.put(
            PREFERENCES_NAMESPACE,
            KEY_CONNECTION,
            connection.map(|c| c.to_string()).as_deref(),
        )
    }

    /// Reads the last auth code handed to the SDK.
    #[must_use]
    pub fn read_last_auth_code(&self) -> Option<String> {
        self.read_string(KEY_AUTH_CODE)
    }

    /// Persists the last auth code; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn write_last_auth_code(&self, code: Option<&str>) -> StorageResult<()> {
        self.backend.put(PREFERENCES_NAMESPACE, KEY_AUTH_CODE, code)
    }

    /// Wipes every key in the current namespace.
    ///
    /// A failed commit here is surfaced, not swallowed: the logout contract
    /// depends on clear-state being trustworthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace removal fails.
    pub fn clear_all(&self) -> StorageResult<()> {
        self.backend.remove_namespace(PREFERENCES_NAMESPACE)
    }

    fn read_string(&self, key: &str) -> Option<String> {
        match self.backend.get(PREFERENCES_NAMESPACE, key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, %err, "read failed, treating as absent");
                None
            }
        }
    }

    fn read_json_token(&self, key: &str) -> Option<Token> {
        let json = self.read_string(key)?;
        match serde_json::from_str::<Token>(&json) {
            Ok(token) if token.is_structurally_valid() => Some(token),
            Ok(_) => {
                tracing::warn!(key, "stored token is structurally invalid, treating as absent");
                None
            }
            Err(err) => {
                tracing::warn!(key, %err, "stored token is malformed, treating as absent");
                None
            }
        }
    }

    fn decrypt_field(&self, secret: &SecretString, key: &str) -> Option<Zeroizing<String>> {
        let decryptor = self.decryptor.as_ref()?;
        let ciphertext = match self.backend.get(&self.legacy_namespace, key) {
            Ok(value) => value?,
            Err(err) => {
                tracing::warn!(key, %err, "legacy read failed, treating as absent");
                return None;
            }
        };
        match decryptor.decrypt(secret, &ciphertext) {
            Ok(plaintext) => Some(plaintext),
            Err(err) => {
                tracing::debug!(key, %err, "legacy field could not be decrypted");
                None
            }
        }
    }

    fn read_legacy_encrypted(&self, secret: &SecretString) -> Option<Token> {
        let access_token = self.decrypt_field(secret, LEGACY_ACCESS_TOKEN)?;
        let user_id = self.decrypt_field(secret, LEGACY_USER_ID)?;
        let expires_at = self
            .decrypt_field(secret, LEGACY_EXPIRES_AT)?
            .parse::<u64>()
            .ok()?;
        let refresh_token = self
            .decrypt_field(secret, LEGACY_REFRESH_TOKEN)
            .map(|plaintext| plaintext.as_str().to_owned());

        let token = Token {
            access_token: access_token.as_str().to_owned(),
            refresh_token,
            user_id: user_id.as_str().to_owned(),
            expires_at,
            scope: None,
            token_type: None,
        };
        token.is_structurally_valid().then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::legacy::DecryptError;
    use authkit_store::MemoryBackend;

    /// Test decryptor: ciphertext is `enc(<secret>):<plaintext>`.
    struct PrefixDecrypt;

    impl LegacyDecrypt for PrefixDecrypt {
        fn decrypt(
            &self,
            secret: &SecretString,
            ciphertext: &str,
        ) -> Result<Zeroizing<String>, DecryptError> {
            use secrecy::ExposeSecret;
            let prefix = format!("enc({}):", secret.expose_secret());
            ciphertext
                .strip_prefix(&prefix)
                .map(|plain| Zeroizing::new(plain.to_owned()))
                .ok_or_else(|| DecryptError("secret mismatch".into()))
        }
    }

    fn encrypt(secret: &str, plaintext: &str) -> String {
        format!("enc({secret}):{plaintext}")
    }

    fn token(user_id: &str) -> Token {
        Token {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            user_id: user_id.into(),
            expires_at: 2_000_000_000,
            scope: None,
            token_type: Some("Bearer".into()),
        }
    }

    fn store_with_legacy(backend: Arc<MemoryBackend>) -> TokenStore {
        TokenStore::with_legacy(backend, Arc::new(PrefixDecrypt), DEFAULT_LEGACY_NAMESPACE)
    }

    fn seed_legacy(backend: &MemoryBackend, secret: &str, expires_at: &str) {
        for (key, plain) in [
            (LEGACY_ACCESS_TOKEN, "legacy-at"),
            (LEGACY_REFRESH_TOKEN, "legacy-rt"),
            (LEGACY_USER_ID, "legacy-user"),
            (LEGACY_EXPIRES_AT, expires_at),
        ] {
            backend
                .put(
                    DEFAULT_LEGACY_NAMESPACE,
                    key,
                    Some(&encrypt(secret, plain)),
                )
                .expect("seed");
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let store = TokenStore::new(Arc::new(MemoryBackend::new()));
        let t = token("u1");
        store.write_token(Some(&t)).expect("write");
        assert_eq!(store.read_current_token(), Some(t));
    }

    #[test]
    fn test_write_none_clears_current_token() {
        let store = TokenStore::new(Arc::new(MemoryBackend::new()));
        store.write_token(Some(&token("u1"))).expect("write");
        store.write_token(None).expect("clear");
        assert_eq!(store.read_current_token(), None);
    }

    #[test]
    fn test_malformed_blob_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put(PREFERENCES_NAMESPACE, KEY_CURRENT_TOKEN, Some("{not json"))
            .expect("seed");
        let store = TokenStore::new(backend);
        assert_eq!(store.read_current_token(), None);
        assert_eq!(store.read_token_compat(None), None);
    }

    #[test]
    fn test_current_variant_takes_precedence_over_deprecated() {
        let backend = Arc::new(MemoryBackend::new());
        let current = token("current-user");
        let deprecated = token("deprecated-user");
        backend
            .put(
                PREFERENCES_NAMESPACE,
                KEY_CURRENT_TOKEN,
                Some(&serde_json::to_string(&current).unwrap()),
            )
            .expect("seed");
        backend
            .put(
                PREFERENCES_NAMESPACE,
                KEY_DEPRECATED_TOKEN,
                Some(&serde_json::to_string(&deprecated).unwrap()),
            )
            .expect("seed");

        let store = TokenStore::new(backend);
        assert_eq!(store.read_token_compat(None), Some(current));
    }

    #[test]
    fn test_deprecated_variant_is_read_but_never_written() {
        let backend = Arc::new(MemoryBackend::new());
        let deprecated = token("deprecated-user");
        backend
            .put(
                PREFERENCES_NAMESPACE,
                KEY_DEPRECATED_TOKEN,
                Some(&serde_json::to_string(&deprecated).unwrap()),
            )
            .expect("seed");

        let store = TokenStore::new(Arc::clone(&backend) as Arc<dyn KvBackend>);
        assert_eq!(store.read_token_compat(None), Some(deprecated));
        assert_eq!(store.read_current_token(), None);

        // Writing always produces the current variant only.
        store.write_token(Some(&token("new-user"))).expect("write");
        store.clear_token().expect("clear");
        store.write_token(Some(&token("new-user"))).expect("write");
        assert_eq!(
            backend
                .get(PREFERENCES_NAMESPACE, KEY_DEPRECATED_TOKEN)
                .expect("get"),
            None
        );
    }

    #[test]
    fn test_legacy_variant_requires_secret() {
        let backend = Arc::new(MemoryBackend::new());
        seed_legacy(&backend, "s3cret", "2000000000");
        let store = store_with_legacy(Arc::clone(&backend));

        assert_eq!(store.read_token_compat(None), None);

        let wrong = SecretString::from("wrong");
        assert_eq!(store.read_token_compat(Some(&wrong)), None);

        let right = SecretString::from("s3cret");
        let t = store.read_token_compat(Some(&right)).expect("legacy token");
        assert_eq!(t.access_token, "legacy-at");
        assert_eq!(t.refresh_token.as_deref(), Some("legacy-rt"));
        assert_eq!(t.user_id, "legacy-user");
        assert_eq!(t.expires_at, 2_000_000_000);
    }

    #[test]
    fn test_legacy_variant_missing_required_field_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        seed_legacy(&backend, "s3cret", "2000000000");
        backend
            .put(DEFAULT_LEGACY_NAMESPACE, LEGACY_USER_ID, None)
            .expect("drop field");
        let store = store_with_legacy(backend);
        let secret = SecretString::from("s3cret");
        assert_eq!(store.read_token_compat(Some(&secret)), None);
    }

    #[test]
    fn test_clear_token_removes_every_variant() {
        let backend = Arc::new(MemoryBackend::new());
        seed_legacy(&backend, "s3cret", "2000000000");
        backend
            .put(
                PREFERENCES_NAMESPACE,
                KEY_DEPRECATED_TOKEN,
                Some(&serde_json::to_string(&token("old")).unwrap()),
            )
            .expect("seed");
        let store = store_with_legacy(Arc::clone(&backend));
        store.write_token(Some(&token("u1"))).expect("write");

        store.clear_token().expect("clear");

        let secret = SecretString::from("s3cret");
        assert_eq!(store.read_token_compat(Some(&secret)), None);
        assert!(!backend
            .contains(DEFAULT_LEGACY_NAMESPACE, LEGACY_ACCESS_TOKEN)
            .expect("contains"));
    }

    #[test]
    fn test_passwordless_handle_and_connection_round_trip() {
        let store = TokenStore::new(Arc::new(MemoryBackend::new()));
        assert_eq!(store.read_passwordless_handle(), None);

        let handle = PasswordlessHandle::new("plt-1");
        store
            .write_passwordless_handle(Some(&handle))
            .expect("write");
        assert_eq!(store.read_passwordless_handle(), Some(handle));

        store
            .write_last_connection(Some(ConnectionType::Sms))
            .expect("write");
        assert_eq!(store.read_last_connection(), Some(ConnectionType::Sms));

        store.write_last_auth_code(Some("code-1")).expect("write");
        assert_eq!(store.read_last_auth_code(), Some("code-1".into()));

        store.write_passwordless_handle(None).expect("clear");
        assert_eq!(store.read_passwordless_handle(), None);
    }

    #[test]
    fn test_clear_all_surfaces_commit_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let store = TokenStore::new(Arc::clone(&backend) as Arc<dyn KvBackend>);
        store.write_token(Some(&token("u1"))).expect("write");

        backend.set_fail_writes(true);
        assert!(store.clear_all().is_err());

        backend.set_fail_writes(false);
        store.clear_all().expect("clear");
        assert_eq!(store.read_current_token(), None);
    }
}
