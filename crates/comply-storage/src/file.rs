//! File-based storage backend.
//!
//! Stores one document per key inside a local data directory. The key
//! `comply/tracker` maps to the file `comply~tracker.json`. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! never leaves a truncated document behind — the previous version stays
//! intact until the rename.
//!
//! Concurrent processes sharing a data directory get last-write-wins with
//! no conflict detection. That is a documented limitation of the whole
//! tool, not something this backend papers over.

use std::path::{Path, PathBuf};

use crate::{StorageBackend, StorageError};

/// File extension for stored documents.
const EXT: &str = ".json";
/// Suffix for the temporary file used during atomic writes.
const TMP_SUFFIX: &str = ".tmp";
/// Separator keys use; encoded as `~` in file names so the mapping is
/// reversible when listing.
const KEY_SEP: char = '/';
const FILE_SEP: char = '~';

/// A storage backend that keeps one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (or create) a file backend rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::Open {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(dir = %dir.display(), "file backend opened");
        Ok(Self { dir })
    }

    /// The data directory this backend reads and writes.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.dir.join(format!("{}{EXT}", encode_key(key)?)))
    }
}

/// Map a storage key to a file stem. Keys may contain ASCII alphanumerics,
/// `.`, `_`, `-`, and `/`; the separator becomes `~` so decoding is exact.
fn encode_key(key: &str) -> Result<String, StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            reason: "key is empty".to_owned(),
        });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'))
    {
        return Err(StorageError::InvalidKey {
            reason: format!("key '{key}' contains characters outside [A-Za-z0-9._-/]"),
        });
    }
    Ok(key.replace(KEY_SEP, &FILE_SEP.to_string()))
}

/// Reverse of [`encode_key`], applied to file stems found on disk.
fn decode_stem(stem: &str) -> String {
    stem.replace(FILE_SEP, &KEY_SEP.to_string())
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension(format!("json{TMP_SUFFIX}"));

        let write_err = |e: std::io::Error| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        };

        tokio::fs::write(&tmp, value).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let list_err = |e: std::io::Error| StorageError::List {
            prefix: prefix.to_owned(),
            reason: e.to_string(),
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(list_err)?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(EXT) else {
                // Temp files and strays are not documents.
                continue;
            };
            let key = decode_stem(stem);
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn make_backend() -> (tempfile::TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let (_dir, backend) = make_backend();
        let val = backend.get("comply/tracker").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn put_and_get_roundtrip() {
        let (_dir, backend) = make_backend();
        backend.put("comply/tracker", b"{}").await.unwrap();
        let val = backend.get("comply/tracker").await.unwrap();
        assert_eq!(val, Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn put_overwrites_existing() {
        let (_dir, backend) = make_backend();
        backend.put("key", b"v1").await.unwrap();
        backend.put("key", b"v2").await.unwrap();
        let val = backend.get("key").await.unwrap();
        assert_eq!(val, Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, backend) = make_backend();
        backend.put("key", b"val").await.unwrap();
        backend.delete("key").await.unwrap();
        backend.delete("key").await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_decodes_keys_and_filters_by_prefix() {
        let (_dir, backend) = make_backend();
        backend.put("comply/tracker", b"1").await.unwrap();
        backend.put("comply/clients", b"2").await.unwrap();
        backend.put("other", b"3").await.unwrap();

        let keys = backend.list("comply/").await.unwrap();
        assert_eq!(keys, vec!["comply/clients", "comply/tracker"]);

        let all = backend.list("").await.unwrap();
        assert_eq!(all, vec!["comply/clients", "comply/tracker", "other"]);
    }

    #[tokio::test]
    async fn list_skips_temp_files() {
        let (dir, backend) = make_backend();
        backend.put("comply/tracker", b"1").await.unwrap();
        std::fs::write(dir.path().join("comply~clients.json.tmp"), b"x").unwrap();

        let keys = backend.list("").await.unwrap();
        assert_eq!(keys, vec!["comply/tracker"]);
    }

    #[tokio::test]
    async fn rejects_empty_key() {
        let (_dir, backend) = make_backend();
        let result = backend.put("", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn rejects_key_with_unsupported_characters() {
        let (_dir, backend) = make_backend();
        let result = backend.put("comply/has space", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.put("comply/settings", b"persisted").await.unwrap();
        }
        let backend = FileBackend::open(dir.path()).unwrap();
        let val = backend.get("comply/settings").await.unwrap();
        assert_eq!(val, Some(b"persisted".to_vec()));
    }
}
