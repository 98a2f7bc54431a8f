//! Shared helpers for integration tests.

pub mod socket_guard;

use std::path::PathBuf;

use tempfile::TempDir;

/// Temp directory plus a cache file path inside it. Keep the `TempDir` alive
/// for as long as the path is used.
#[allow(dead_code)]
pub fn temp_cache() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("sessions.json");
    (dir, path)
}
