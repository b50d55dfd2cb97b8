//! Device-scoped string key-value storage.
//!
//! This is the fallback mirror for anonymous sessions and the parking area
//! for quotes the document store refused. Reads and writes may fail at any
//! time (full disk, permissions, quota); callers treat every failure as soft.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;

/// Errors from local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid local storage key: {0}")]
    InvalidKey(String),

    #[error("local storage quota exceeded")]
    QuotaExceeded,
}

/// Synchronous string key-value storage.
pub trait LocalStorage: Send + Sync {
    /// Read a value, `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryLocalStorage {
    items: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryLocalStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once keys plus values exceed `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            items: RwLock::default(),
            quota_bytes: Some(bytes),
        }
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self
            .items
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self
            .items
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
///
/// Keys are restricted to ASCII alphanumerics, `_`, `-` and `.` so a key can
/// never escape the directory.
#[derive(Debug, Clone)]
pub struct FileLocalStorage {
    dir: PathBuf,
}

impl FileLocalStorage {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalStorage for FileLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // Write-then-rename so a crash never leaves a truncated value behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trip_and_remove() {
        let storage = MemoryLocalStorage::new();
        assert_eq!(storage.get_item("guest_cart").unwrap(), None);
        storage.set_item("guest_cart", "[]").unwrap();
        assert_eq!(storage.get_item("guest_cart").unwrap().as_deref(), Some("[]"));
        storage.remove_item("guest_cart").unwrap();
        storage.remove_item("guest_cart").unwrap();
        assert_eq!(storage.get_item("guest_cart").unwrap(), None);
    }

    #[test]
    fn test_memory_quota() {
        let storage = MemoryLocalStorage::with_quota(16);
        storage.set_item("k", "short").unwrap();
        assert!(matches!(
            storage.set_item("other", "much too long a value"),
            Err(StorageError::QuotaExceeded)
        ));
        // Overwriting an existing key only counts the new value.
        storage.set_item("k", "0123456789abcd").unwrap();
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileLocalStorage::open(dir.path()).unwrap();
        first.set_item("guest_wishlist", r#"[{"x":1}]"#).unwrap();

        let second = FileLocalStorage::open(dir.path()).unwrap();
        assert_eq!(
            second.get_item("guest_wishlist").unwrap().as_deref(),
            Some(r#"[{"x":1}]"#)
        );
        assert_eq!(second.get_item("missing").unwrap(), None);
    }

    #[test]
    fn test_file_storage_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileLocalStorage::open(dir.path()).unwrap();
        assert!(matches!(
            storage.set_item("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.get_item(""), Err(StorageError::InvalidKey(_))));
    }
}
