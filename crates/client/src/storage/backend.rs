//! Raw storage backends.
//!
//! Backends are string-keyed, string-valued, synchronous, and fallible.
//! They make no attempt to recover from failures; that is the job of
//! [`KeyValueStore`](super::KeyValueStore).

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::StorageError;

/// A persistent string store shared by every tab of the storefront.
pub trait StorageBackend: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected (quota, disabled storage, I/O).
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// In-memory backend
// =============================================================================

/// In-process backend.
///
/// Clones share the same underlying map, so several tabs can be wired to one
/// backend. An optional byte quota and a disabled switch let callers
/// reproduce the failure modes of browser storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
    disabled: bool,
}

impl MemoryInner {
    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl MemoryBackend {
    /// Create an empty, unlimited backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backend that rejects writes beyond `bytes` (keys plus values).
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let backend = Self::default();
        if let Ok(mut inner) = backend.inner.lock() {
            inner.quota_bytes = Some(bytes);
        }
        backend
    }

    /// Simulate storage being turned off (every operation fails).
    pub fn set_disabled(&self, disabled: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.disabled = disabled;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        let inner = self.inner.lock().map_err(|_| StorageError::Unavailable)?;
        if inner.disabled {
            return Err(StorageError::Unavailable);
        }
        Ok(inner)
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if let Some(limit) = inner.quota_bytes {
            let needed = inner.used_bytes_excluding(key) + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        inner.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.items.remove(key);
        Ok(())
    }
}

// =============================================================================
// File backend
// =============================================================================

/// Backend persisting every entry in one JSON object on disk.
///
/// The file is re-read on every access so separate processes sharing the
/// path observe each other's writes. Writes go to a sibling temp file that
/// is then renamed over the original.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Create a backend for `path`. The file and its parent directory are
    /// created lazily on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the map for modification. A corrupt file is replaced rather than
    /// blocking every future write.
    fn read_map_for_write(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.read_map() {
            Err(StorageError::Serialization(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding corrupt storage file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(map)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Unavailable)?;
        let mut map = self.read_map_for_write()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|map| {
            map.remove(key);
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_clones_share_state() {
        let a = MemoryBackend::new();
        let b = a.clone();
        a.set_item("token", "t1").unwrap();
        assert_eq!(b.get_item("token").unwrap().as_deref(), Some("t1"));
        b.remove_item("token").unwrap();
        assert!(a.get_item("token").unwrap().is_none());
    }

    #[test]
    fn test_memory_quota() {
        let backend = MemoryBackend::with_quota(16);
        backend.set_item("cart", "[1,2]").unwrap();
        let err = backend.set_item("user", "{\"name\":\"long\"}").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        // Overwriting an existing key only counts the new value
        backend.set_item("cart", "[1,2,3]").unwrap();
    }

    #[test]
    fn test_memory_disabled() {
        let backend = MemoryBackend::new();
        backend.set_disabled(true);
        assert!(matches!(backend.get_item("x"), Err(StorageError::Unavailable)));
        assert!(matches!(backend.set_item("x", "1"), Err(StorageError::Unavailable)));
        backend.set_disabled(false);
        backend.set_item("x", "1").unwrap();
    }

    #[test]
    fn test_file_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let first = FileBackend::new(&path);
        first.set_item("token", "abc").unwrap();
        first.set_item("tokenExpiry", "1700000000000").unwrap();
        first.remove_item("tokenExpiry").unwrap();

        let second = FileBackend::new(&path);
        assert_eq!(second.get_item("token").unwrap().as_deref(), Some("abc"));
        assert!(second.get_item("tokenExpiry").unwrap().is_none());
    }

    #[test]
    fn test_file_backend_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{ not json").unwrap();

        let backend = FileBackend::new(&path);
        assert!(matches!(
            backend.get_item("token"),
            Err(StorageError::Serialization(_))
        ));

        // The next write starts over with a fresh document
        backend.set_item("token", "abc").unwrap();
        assert_eq!(backend.get_item("token").unwrap().as_deref(), Some("abc"));
    }
}
