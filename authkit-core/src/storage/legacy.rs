//! Legacy encrypted-credential compatibility.

use secrecy::SecretString;
use thiserror::Error;
use zeroize::Zeroizing;

/// Failure decrypting a legacy credential field.
///
/// During compatibility reads these are expected for installs that never had
/// legacy data; they are swallowed as "no legacy credential found", never
/// treated as fatal.
#[derive(Debug, Error)]
#[error("legacy decryption failed: {0}")]
pub struct DecryptError(pub String);

/// Decryption primitive for the legacy-encrypted storage variant.
///
/// The encryption scheme belongs to an older storage format outside this
/// crate; implementations are injected by the embedding application.
pub trait LegacyDecrypt: Send + Sync {
    /// Decrypts `ciphertext` with `secret`, returning the plaintext.
    ///
    /// The returned buffer is zeroized on drop so decrypted credential
    /// material does not linger.
    ///
    /// # Errors
    ///
    /// Returns [`DecryptError`] if the secret is wrong or the ciphertext is
    /// malformed.
    fn decrypt(
        &self,
        secret: &SecretString,
        ciphertext: &str,
    ) -> Result<Zeroizing<String>, DecryptError>;
}
