//! Serialized session state and the cache file document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cookie::{StoredCookie, unix_now};

/// Marker identifying a persession cache document.
pub(crate) const FORMAT_MARKER: &str = "persession-cache";

/// Current cache document version.
pub(crate) const FORMAT_VERSION: u32 = 1;

/// One session's persisted state: cookies, default headers and save time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBlob {
    /// Cookies with absolute expiry timestamps.
    pub cookies: Vec<StoredCookie>,
    /// Default request headers (name → value).
    pub headers: BTreeMap<String, String>,
    /// Unix seconds when the blob was written.
    pub saved_at: u64,
}

impl CachedBlob {
    /// Creates a blob stamped with the current time.
    #[must_use]
    pub fn new(cookies: Vec<StoredCookie>, headers: BTreeMap<String, String>) -> Self {
        Self {
            cookies,
            headers,
            saved_at: unix_now(),
        }
    }

    /// Returns true when the blob is older than `max_age_secs` at `now`.
    #[must_use]
    pub fn is_older_than(&self, max_age_secs: u64, now: u64) -> bool {
        now.saturating_sub(self.saved_at) > max_age_secs
    }
}

/// The whole cache file: every session keyed by its session key.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CacheDocument {
    pub(crate) format: String,
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) sessions: BTreeMap<String, CachedBlob>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            format: FORMAT_MARKER.to_string(),
            version: FORMAT_VERSION,
            sessions: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_serializes_expiry_as_absolute_timestamp() {
        let blob = CachedBlob {
            cookies: vec![
                StoredCookie::new("sid", "abc", "example.com", "/").with_expires(4_102_444_800),
            ],
            headers: BTreeMap::from([("accept".to_string(), "text/html".to_string())]),
            saved_at: 1_700_000_000,
        };

        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["cookies"][0]["expires"], 4_102_444_800_u64);
        assert_eq!(json["cookies"][0]["value"], "abc");
        assert_eq!(json["saved_at"], 1_700_000_000_u64);

        let restored: CachedBlob = serde_json::from_value(json).unwrap();
        assert_eq!(restored, blob);
    }

    #[test]
    fn test_session_cookie_omits_expiry_field() {
        let blob = CachedBlob {
            cookies: vec![StoredCookie::new("sid", "abc", "example.com", "/")],
            ..CachedBlob::default()
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert!(json["cookies"][0].get("expires").is_none());
    }

    #[test]
    fn test_is_older_than() {
        let blob = CachedBlob {
            saved_at: 1_000,
            ..CachedBlob::default()
        };
        assert!(!blob.is_older_than(3_600, 4_600));
        assert!(blob.is_older_than(3_600, 4_601));
        assert!(!blob.is_older_than(3_600, 500), "clock skew never expires a blob");
    }

    #[test]
    fn test_default_document_carries_marker_and_version() {
        let document = CacheDocument::default();
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["format"], FORMAT_MARKER);
        assert_eq!(json["version"], FORMAT_VERSION);
    }
}
