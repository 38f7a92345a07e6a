//! File-backed backend with atomic commits.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::KvBackend;
use crate::error::{StorageError, StorageResult};

/// [`KvBackend`] storing each namespace as a JSON document under a root
/// directory.
///
/// Writes go to a sibling temp file first and are renamed over the target,
/// so a crash mid-write leaves either the old document or the new one,
/// never a torn file. A write is a read-modify-write of the whole document,
/// so all writes are serialized behind an internal lock; concurrent writers
/// of different keys in one namespace never lose each other's commits.
pub struct FileBackend {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens (creating if needed) a backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.json"))
    }

    fn load(&self, namespace: &str) -> StorageResult<HashMap<String, String>> {
        let path = self.namespace_path(namespace);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new())
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                // A corrupt namespace document is unreadable state, not a
                // reason to fail every read. Callers treat it as empty.
                tracing::warn!(namespace, %err, "unreadable namespace document, treating as empty");
                Ok(HashMap::new())
            }
        }
    }

    fn store(
        &self,
        namespace: &str,
        key: &str,
        attempted_value: Option<&str>,
        entries: &HashMap<String, String>,
    ) -> StorageResult<()> {
        let path = self.namespace_path(namespace);
        let bytes = serde_json::to_vec(entries)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        let commit = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        commit.map_err(|err| {
            let _ = fs::remove_file(&tmp);
            tracing::error!(namespace, key, %err, "failed to commit namespace document");
            StorageError::CommitFailed {
                key: key.to_string(),
                attempted_value: attempted_value.map(ToString::to_string),
            }
        })
    }
}

impl KvBackend for FileBackend {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load(namespace)?.remove(key))
    }

    fn put(&self, namespace: &str, key: &str, value: Option<&str>) -> StorageResult<()> {
        let _guard = self.lock();
        let mut entries = self.load(namespace)?;
        match value {
            Some(value) => entries.insert(key.to_string(), value.to_string()),
            None => entries.remove(key),
        };
        self.store(namespace, key, value, &entries)
    }

    fn remove_namespace(&self, namespace: &str) -> StorageResult<()> {
        let _guard = self.lock();
        match fs::remove_file(self.namespace_path(namespace)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
