//! File-backed credential store shared by multiple session keys.
//!
//! Writers take an exclusive advisory lock on a sidecar `<file>.lock`, re-read
//! the current document, merge their key, and replace the file by renaming a
//! fully written temp file over it. Readers never take the lock: the rename
//! guarantees they observe either the old or the new document, never a mix.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, instrument};

use super::blob::{CacheDocument, CachedBlob, FORMAT_MARKER, FORMAT_VERSION};
use super::crypto::{self, EncryptionKey};
use super::error::{StorageError, StoreOperation};

/// Reads and writes session blobs in one cache file.
///
/// # Example
///
/// ```no_run
/// use persession::store::{CachedBlob, CredentialStore};
///
/// # fn example() -> Result<(), persession::StorageError> {
/// let store = CredentialStore::new("/tmp/sessions.json");
/// store.save("work", &CachedBlob::default())?;
/// assert!(store.load("work")?.is_some());
/// assert!(store.load("personal")?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    encryption: Option<EncryptionKey>,
}

impl CredentialStore {
    /// Creates a store for the cache file at `path`. Nothing is read yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encryption: None,
        }
    }

    /// Seals the file with `key` on every write.
    #[must_use]
    pub fn with_encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption = Some(key);
        self
    }

    /// Cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when writes are sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Loads the blob stored under `key`.
    ///
    /// Returns `Ok(None)` when the file or the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on I/O failure or when the file exists but is
    /// corrupt, sealed without a configured key, or sealed with another key.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self, key: &str) -> Result<Option<CachedBlob>, StorageError> {
        let operation = StoreOperation::load(key);
        let Some(mut document) = self.read_document(&operation)? else {
            debug!("cache file not found");
            return Ok(None);
        };

        let blob = document.sessions.remove(key);
        debug!(found = blob.is_some(), "cache file read");
        Ok(blob)
    }

    /// Stores `blob` under `key`, leaving every other key untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the lock cannot be taken, the existing
    /// file cannot be decoded, or the new file cannot be written.
    #[instrument(level = "debug", skip(self, blob), fields(path = %self.path.display()))]
    pub fn save(&self, key: &str, blob: &CachedBlob) -> Result<(), StorageError> {
        let operation = StoreOperation::save(key);
        let _lock = self.lock_exclusive(&operation)?;

        let mut document = self.read_document(&operation)?.unwrap_or_default();
        document.sessions.insert(key.to_string(), blob.clone());
        self.write_document(&operation, &document)?;

        debug!(
            cookies = blob.cookies.len(),
            headers = blob.headers.len(),
            "session saved"
        );
        Ok(())
    }

    /// Removes the blob stored under `key`.
    ///
    /// Returns `true` when the key existed and was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] under the same conditions as [`save`](Self::save).
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let operation = StoreOperation::delete(key);
        let _lock = self.lock_exclusive(&operation)?;

        let Some(mut document) = self.read_document(&operation)? else {
            return Ok(false);
        };
        if document.sessions.remove(key).is_none() {
            return Ok(false);
        }

        self.write_document(&operation, &document)?;
        debug!("session deleted");
        Ok(true)
    }

    /// Lists the session keys held by the cache file (sorted).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] under the same conditions as [`load`](Self::load).
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .read_document(&StoreOperation::ListKeys)?
            .map(|document| document.sessions.into_keys().collect())
            .unwrap_or_default())
    }

    fn read_document(
        &self,
        operation: &StoreOperation,
    ) -> Result<Option<CacheDocument>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StorageError::io(operation.clone(), &self.path, error)),
        };

        self.decode(operation, &bytes).map(Some)
    }

    fn decode(
        &self,
        operation: &StoreOperation,
        bytes: &[u8],
    ) -> Result<CacheDocument, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::corrupt(operation.clone(), &self.path, "file is empty"));
        }

        let opened;
        let json = if crypto::is_sealed(bytes) {
            let key = self
                .encryption
                .as_ref()
                .ok_or_else(|| StorageError::KeyRequired {
                    operation: operation.clone(),
                    path: self.path.clone(),
                })?;
            opened = crypto::open(bytes, key).ok_or_else(|| StorageError::DecryptionFailed {
                operation: operation.clone(),
                path: self.path.clone(),
            })?;
            opened.as_slice()
        } else {
            bytes
        };

        let document: CacheDocument = serde_json::from_slice(json).map_err(|error| {
            StorageError::corrupt(operation.clone(), &self.path, format!("invalid JSON: {error}"))
        })?;

        if document.format != FORMAT_MARKER {
            return Err(StorageError::corrupt(
                operation.clone(),
                &self.path,
                format!("unrecognized format marker '{}'", document.format),
            ));
        }
        if document.version != FORMAT_VERSION {
            return Err(StorageError::corrupt(
                operation.clone(),
                &self.path,
                format!("unsupported cache version {}", document.version),
            ));
        }

        Ok(document)
    }

    fn encode(
        &self,
        operation: &StoreOperation,
        document: &CacheDocument,
    ) -> Result<Vec<u8>, StorageError> {
        let json =
            serde_json::to_vec_pretty(document).map_err(|source| StorageError::Serialize {
                operation: operation.clone(),
                path: self.path.clone(),
                source,
            })?;

        match &self.encryption {
            Some(key) => crypto::seal(&json, key).ok_or_else(|| StorageError::EncryptionFailed {
                operation: operation.clone(),
                path: self.path.clone(),
            }),
            None => Ok(json),
        }
    }

    fn write_document(
        &self,
        operation: &StoreOperation,
        document: &CacheDocument,
    ) -> Result<(), StorageError> {
        let payload = self.encode(operation, document)?;
        write_atomic(&self.path, &payload)
            .map_err(|error| StorageError::io(operation.clone(), &self.path, error))
    }

    fn lock_exclusive(&self, operation: &StoreOperation) -> Result<LockGuard, StorageError> {
        let lock_path = lock_path_for(&self.path);
        fs::create_dir_all(parent_dir(&lock_path))
            .map_err(|error| StorageError::lock(operation.clone(), &lock_path, error))?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|error| StorageError::lock(operation.clone(), &lock_path, error))?;
        FileExt::lock_exclusive(&file)
            .map_err(|error| StorageError::lock(operation.clone(), &lock_path, error))?;

        Ok(LockGuard { file })
    }
}

/// Releases the advisory lock on drop.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("persession"), OsStr::to_os_string);
    name.push(".lock");
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn write_atomic(path: &Path, payload: &[u8]) -> io::Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".persession-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(payload)?;
    temp.as_file().sync_all()?;
    set_owner_only_permissions(temp.as_file())?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}
