//! In-memory backend for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::backend::KvBackend;
use crate::error::{StorageError, StorageResult};

/// `HashMap`-backed [`KvBackend`].
///
/// Not durable across process restarts. Writes can be made to fail on demand
/// with [`MemoryBackend::set_fail_writes`], which lets consumers exercise
/// their commit-failure handling.
#[derive(Default)]
pub struct MemoryBackend {
    namespaces: Mutex<HashMap<String, HashMap<String, String>>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every subsequent `put` and `remove_namespace` reports a
    /// commit failure without mutating state.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, String>>> {
        self.namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<String>> {
        Ok(self
            .lock()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    fn put(&self, namespace: &str, key: &str, value: Option<&str>) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::CommitFailed {
                key: key.to_string(),
                attempted_value: value.map(ToString::to_string),
            });
        }
        let mut namespaces = self.lock();
        match value {
            Some(value) => {
                namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(key.to_string(), value.to_string());
            }
            None => {
                if let Some(ns) = namespaces.get_mut(namespace) {
                    ns.remove(key);
                }
            }
        }
        Ok(())
    }

    fn remove_namespace(&self, namespace: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::CommitFailed {
                key: namespace.to_string(),
                attempted_value: None,
            });
        }
        self.lock().remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_round_trip() {
        let backend = MemoryBackend::new();
        backend.put("prefs", "k", Some("v")).expect("put");
        assert_eq!(backend.get("prefs", "k").expect("get"), Some("v".into()));
        assert!(backend.contains("prefs", "k").expect("contains"));
    }

    #[test]
    fn test_put_none_clears_key() {
        let backend = MemoryBackend::new();
        backend.put("prefs", "k", Some("v")).expect("put");
        backend.put("prefs", "k", None).expect("clear");
        assert_eq!(backend.get("prefs", "k").expect("get"), None);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let backend = MemoryBackend::new();
        backend.put("a", "k", Some("1")).expect("put");
        backend.put("b", "k", Some("2")).expect("put");
        backend.remove_namespace("a").expect("remove");
        assert_eq!(backend.get("a", "k").expect("get"), None);
        assert_eq!(backend.get("b", "k").expect("get"), Some("2".into()));
    }

    #[test]
    fn test_fail_writes_reports_commit_failure_and_keeps_state() {
        let backend = MemoryBackend::new();
        backend.put("prefs", "k", Some("v")).expect("put");
        backend.set_fail_writes(true);

        let err = backend.put("prefs", "k", Some("other")).unwrap_err();
        match err {
            StorageError::CommitFailed {
                key,
                attempted_value,
            } => {
                assert_eq!(key, "k");
                assert_eq!(attempted_value.as_deref(), Some("other"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        backend.set_fail_writes(false);
        assert_eq!(backend.get("prefs", "k").expect("get"), Some("v".into()));
    }
}
