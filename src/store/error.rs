//! Error types for the credential store.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The store operation that was running when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    /// Loading one session's blob.
    Load {
        /// Session key being loaded.
        key: String,
    },
    /// Saving one session's blob.
    Save {
        /// Session key being saved.
        key: String,
    },
    /// Deleting one session's blob.
    Delete {
        /// Session key being deleted.
        key: String,
    },
    /// Listing the keys held by a cache file.
    ListKeys,
}

impl StoreOperation {
    pub(crate) fn load(key: &str) -> Self {
        Self::Load {
            key: key.to_string(),
        }
    }

    pub(crate) fn save(key: &str) -> Self {
        Self::Save {
            key: key.to_string(),
        }
    }

    pub(crate) fn delete(key: &str) -> Self {
        Self::Delete {
            key: key.to_string(),
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { key } => write!(f, "load of session '{key}'"),
            Self::Save { key } => write!(f, "save of session '{key}'"),
            Self::Delete { key } => write!(f, "delete of session '{key}'"),
            Self::ListKeys => f.write_str("listing session keys"),
        }
    }
}

/// Errors for cache file operations.
///
/// A missing cache file is never an error; loads report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failed.
    #[error("{operation} failed on {path}: {source}")]
    Io {
        /// Operation in progress.
        operation: StoreOperation,
        /// File that could not be read or written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The advisory lock guarding read-merge-write could not be taken.
    #[error("{operation} could not lock {path}: {source}")]
    Lock {
        /// Operation in progress.
        operation: StoreOperation,
        /// Lock file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but cannot be understood.
    #[error("{operation} failed: cache file {path} is corrupt: {reason}")]
    Corrupt {
        /// Operation in progress.
        operation: StoreOperation,
        /// Cache file path.
        path: PathBuf,
        /// What was wrong with the contents.
        reason: String,
    },

    /// The cache file is encrypted and no key was configured.
    #[error(
        "{operation} failed: cache file {path} is encrypted; set PERSESSION_MASTER_KEY or configure an encryption key"
    )]
    KeyRequired {
        /// Operation in progress.
        operation: StoreOperation,
        /// Cache file path.
        path: PathBuf,
    },

    /// Decryption failed (wrong key or tampered payload).
    #[error("{operation} failed: could not decrypt cache file {path}")]
    DecryptionFailed {
        /// Operation in progress.
        operation: StoreOperation,
        /// Cache file path.
        path: PathBuf,
    },

    /// Encryption failed.
    #[error("{operation} failed: could not encrypt cache file {path}")]
    EncryptionFailed {
        /// Operation in progress.
        operation: StoreOperation,
        /// Cache file path.
        path: PathBuf,
    },

    /// The cache document could not be serialized.
    #[error("{operation} failed: could not serialize cache file {path}: {source}")]
    Serialize {
        /// Operation in progress.
        operation: StoreOperation,
        /// Cache file path.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(
        operation: StoreOperation,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn lock(
        operation: StoreOperation,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Lock {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(
        operation: StoreOperation,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Corrupt {
            operation,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Operation that was running when the error occurred.
    #[must_use]
    pub fn operation(&self) -> &StoreOperation {
        match self {
            Self::Io { operation, .. }
            | Self::Lock { operation, .. }
            | Self::Corrupt { operation, .. }
            | Self::KeyRequired { operation, .. }
            | Self::DecryptionFailed { operation, .. }
            | Self::EncryptionFailed { operation, .. }
            | Self::Serialize { operation, .. } => operation,
        }
    }

    /// Returns true when the file exists but its contents could not be decoded.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::DecryptionFailed { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_names_operation_key_and_path() {
        let error = StorageError::io(
            StoreOperation::save("work"),
            "/tmp/cache.json",
            std::io::Error::other("disk full"),
        );
        let msg = error.to_string();
        assert!(msg.contains("save of session 'work'"), "got: {msg}");
        assert!(msg.contains("/tmp/cache.json"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");

        let error = StorageError::corrupt(
            StoreOperation::load("work"),
            "/tmp/cache.json",
            "invalid JSON",
        );
        let msg = error.to_string();
        assert!(msg.contains("load of session 'work'"), "got: {msg}");
        assert!(msg.contains("/tmp/cache.json"), "got: {msg}");
        assert!(msg.contains("invalid JSON"), "got: {msg}");
        assert_eq!(error.operation(), &StoreOperation::load("work"));
    }

    #[test]
    fn test_decode_errors_name_operation_and_key() {
        let error = StorageError::DecryptionFailed {
            operation: StoreOperation::save("personal"),
            path: PathBuf::from("/tmp/cache.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("save of session 'personal'"), "got: {msg}");
        assert!(msg.contains("decrypt"), "got: {msg}");

        let error = StorageError::KeyRequired {
            operation: StoreOperation::delete("old"),
            path: PathBuf::from("/tmp/cache.json"),
        };
        assert!(error.to_string().contains("delete of session 'old'"));
        assert!(error.to_string().contains("PERSESSION_MASTER_KEY"));
    }

    #[test]
    fn test_corrupt_is_corruption() {
        let error =
            StorageError::corrupt(StoreOperation::ListKeys, "/tmp/cache.json", "file is empty");
        assert!(error.is_corruption());
        assert!(error.to_string().contains("file is empty"));

        let key_required = StorageError::KeyRequired {
            operation: StoreOperation::load("work"),
            path: PathBuf::from("/tmp/cache.json"),
        };
        assert!(!key_required.is_corruption());
    }
}
