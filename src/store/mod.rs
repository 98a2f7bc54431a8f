//! Credential store: durable, keyed session state.
//!
//! One cache file holds any number of sessions, each under its own session key:
//!
//! ```json
//! {
//!   "format": "persession-cache",
//!   "version": 1,
//!   "sessions": {
//!     "default": { "cookies": [...], "headers": {...}, "saved_at": 1700000000 }
//!   }
//! }
//! ```
//!
//! The file may optionally be sealed with XChaCha20-Poly1305 (see
//! [`EncryptionKey`]). A missing file is reported as absence; anything
//! unreadable is a [`StorageError`].

mod blob;
mod crypto;
mod error;
mod file;
mod path;

pub use blob::CachedBlob;
pub use crypto::EncryptionKey;
pub use error::{StorageError, StoreOperation};
pub use file::CredentialStore;
pub use path::default_cache_path;
