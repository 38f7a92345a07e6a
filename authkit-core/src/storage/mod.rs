//! Versioned token persistence with backward-compatible reads.
//!
//! Three on-disk schema variants exist, ordered by read precedence:
//!
//! 1. *Current* — a JSON token blob under [`KEY_CURRENT_TOKEN`].
//! 2. *Deprecated* — the same blob under [`KEY_DEPRECATED_TOKEN`], read as a
//!    fallback for a bounded compatibility window and never written.
//! 3. *Legacy-encrypted* — per-field encrypted strings in a separate
//!    namespace, readable only when the caller supplies the secret they
//!    were encrypted with.
//!
//! Writes only ever produce variant 1.

mod legacy;
mod token_store;

pub use legacy::{DecryptError, LegacyDecrypt};
pub use token_store::{
    TokenStore, DEFAULT_LEGACY_NAMESPACE, KEY_AUTH_CODE, KEY_CONNECTION, KEY_CURRENT_TOKEN,
    KEY_DEPRECATED_TOKEN, KEY_PASSWORDLESS_HANDLE, PREFERENCES_NAMESPACE,
};
