//! Abstract transactional key-value backend.

use crate::error::StorageResult;

/// A namespaced string key-value space with transactional writes.
///
/// Every `put` is committed before the call returns: either the value is
/// fully applied or the previous value is still in place and an error is
/// reported. Implementations must be safe to share across threads; callers
/// rely on writes to the same key being serialized.
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key` in `namespace`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails. A missing key or
    /// namespace is `Ok(None)`, not an error.
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<String>>;

    /// Writes `value` under `key` in `namespace`, committing before return.
    ///
    /// Passing `None` clears the key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::CommitFailed`] if the write could not
    /// be confirmed.
    fn put(&self, namespace: &str, key: &str, value: Option<&str>) -> StorageResult<()>;

    /// Removes `namespace` and every key in it.
    ///
    /// Removing a namespace that does not exist is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal could not be committed.
    fn remove_namespace(&self, namespace: &str) -> StorageResult<()>;

    /// Returns whether `key` is present in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn contains(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key)?.is_some())
    }
}
