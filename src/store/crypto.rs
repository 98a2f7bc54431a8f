//! Encryption at rest for cache files.
//!
//! Sealed files are framed as `MAGIC | nonce | ciphertext`, where the
//! ciphertext is the XChaCha20-Poly1305 encryption of the JSON cache document
//! under the SHA-256 digest of the configured key material.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub(crate) const MAGIC: &[u8; 4] = b"PSC1";
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Symmetric key derived from user-supplied key material.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Derives a key from arbitrary key material (passphrase, hex secret, ...).
    #[must_use]
    pub fn from_material(key_material: &str) -> Self {
        let digest = Sha256::digest(key_material.as_bytes());
        let mut bytes = [0_u8; KEY_LEN];
        bytes.copy_from_slice(&digest[..KEY_LEN]);
        Self { bytes }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.bytes))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Returns true when `payload` starts with the sealed-file marker.
pub(crate) fn is_sealed(payload: &[u8]) -> bool {
    payload.starts_with(MAGIC)
}

/// Seals `plaintext`. Returns `None` if the AEAD rejects the input.
pub(crate) fn seal(plaintext: &[u8], key: &EncryptionKey) -> Option<Vec<u8>> {
    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .ok()?;

    let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Some(output)
}

/// Opens a sealed payload. Returns `None` on truncation, wrong key or tampering.
pub(crate) fn open(payload: &[u8], key: &EncryptionKey) -> Option<Vec<u8>> {
    if payload.len() < MAGIC.len() + NONCE_LEN || !is_sealed(payload) {
        return None;
    }

    let nonce_end = MAGIC.len() + NONCE_LEN;
    let nonce = XNonce::from_slice(&payload[MAGIC.len()..nonce_end]);
    key.cipher().decrypt(nonce, &payload[nonce_end..]).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open_with_same_key() {
        let key = EncryptionKey::from_material("test-key");
        let sealed = seal(b"{\"sessions\":{}}", &key).unwrap();
        assert!(is_sealed(&sealed));
        assert_eq!(open(&sealed, &key).unwrap(), b"{\"sessions\":{}}");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = seal(b"secret", &EncryptionKey::from_material("key-a")).unwrap();
        assert!(open(&sealed, &EncryptionKey::from_material("key-b")).is_none());
    }

    #[test]
    fn test_open_rejects_truncated_payload() {
        let key = EncryptionKey::from_material("test-key");
        assert!(open(b"PSC1short", &key).is_none());
        assert!(open(b"not-sealed-data-that-is-long-enough-to-pass", &key).is_none());
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let key = EncryptionKey::from_material("test-key");
        assert_ne!(seal(b"same", &key).unwrap(), seal(b"same", &key).unwrap());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let debug = format!("{:?}", EncryptionKey::from_material("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
