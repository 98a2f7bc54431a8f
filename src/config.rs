//! Session configuration.
//!
//! [`SessionConfig`] collects everything needed to open a [`crate::Session`]:
//! where state is cached, which slot in the cache file belongs to this
//! session, transport settings, and when state is written back to disk.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::store::default_cache_path;

/// Session key used when none is given.
pub const DEFAULT_SESSION_KEY: &str = "default";

/// Redirect limit used when none is given.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

const ENV_CACHE_PATH: &str = "PERSESSION_CACHE_PATH";
const ENV_KEY: &str = "PERSESSION_KEY";
const ENV_MASTER_KEY: &str = "PERSESSION_MASTER_KEY";
const ENV_USER_AGENT: &str = "PERSESSION_USER_AGENT";
const ENV_PROXY: &str = "PERSESSION_PROXY";

const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// When session state is written back to the cache file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistPolicy {
    /// After every completed exchange (write-through).
    #[default]
    AfterEachRequest,
    /// After every completed POST exchange.
    AfterEachPost,
    /// After a login classified as successful.
    AfterEachLogin,
    /// Only on explicit [`crate::Session::flush`].
    Manual,
}

impl PersistPolicy {
    /// Returns the stable label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AfterEachRequest => "after-each-request",
            Self::AfterEachPost => "after-each-post",
            Self::AfterEachLogin => "after-each-login",
            Self::Manual => "manual",
        }
    }
}

/// Invalid session configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The session key is empty or whitespace.
    #[error("session key must not be empty")]
    EmptyKey,

    /// The cache path is empty.
    #[error("cache path must not be empty")]
    EmptyCachePath,

    /// The cache path points at an existing directory.
    #[error("cache path {path} is a directory")]
    CachePathIsDirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A timeout is zero or unreasonably large.
    #[error("invalid {field}: {value:?}. Expected range: 1s..=3600s")]
    InvalidTimeout {
        /// Which timeout.
        field: &'static str,
        /// The rejected value.
        value: Duration,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name as given.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The encryption key material is empty.
    #[error("encryption key must not be empty")]
    EmptyEncryptionKey,
}

impl ConfigError {
    pub(crate) fn invalid_header(name: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidHeader {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Parses a header name/value pair.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidHeader`] when either part is not valid HTTP.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let header_name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| ConfigError::invalid_header(name, e))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|e| ConfigError::invalid_header(name, e))?;
    Ok((header_name, header_value))
}

/// Everything needed to open a session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Cache file holding persisted state.
    pub cache_path: PathBuf,
    /// Slot inside the cache file.
    pub key: String,
    /// Headers sent with every request; cached headers fill in names not set here.
    pub default_headers: HeaderMap,
    /// User-Agent overriding both cached and default headers.
    pub user_agent: Option<String>,
    /// TCP connect timeout. No timeout when unset.
    pub connect_timeout: Option<Duration>,
    /// Per-read timeout. No timeout when unset.
    pub read_timeout: Option<Duration>,
    /// Proxy URL for all traffic. Falls back to environment proxies when unset.
    pub proxy: Option<String>,
    /// Maximum redirects to follow; 0 disables redirect following.
    pub max_redirects: usize,
    /// When state is written back.
    pub persist_policy: PersistPolicy,
    /// Cached state older than this is ignored at open.
    pub cache_max_age: Option<Duration>,
    /// Key material for encryption at rest.
    pub encryption_key: Option<String>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cache_path", &self.cache_path)
            .field("key", &self.key)
            .field(
                "default_headers",
                &self.default_headers.keys().collect::<Vec<_>>(),
            )
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("proxy", &self.proxy.as_ref().map(|_| "<set>"))
            .field("max_redirects", &self.max_redirects)
            .field("persist_policy", &self.persist_policy)
            .field("cache_max_age", &self.cache_max_age)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(default_cache_path())
    }
}

impl SessionConfig {
    /// Config for `cache_path` with the default key and no transport limits.
    #[must_use]
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            key: DEFAULT_SESSION_KEY.to_string(),
            default_headers: HeaderMap::new(),
            user_agent: None,
            connect_timeout: None,
            read_timeout: None,
            proxy: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            persist_policy: PersistPolicy::default(),
            cache_max_age: None,
            encryption_key: None,
        }
    }

    /// Config built from `PERSESSION_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `PERSESSION_CACHE_PATH` | `cache_path` (default: [`default_cache_path`]) |
    /// | `PERSESSION_KEY` | `key` |
    /// | `PERSESSION_MASTER_KEY` | `encryption_key` |
    /// | `PERSESSION_USER_AGENT` | `user_agent` |
    /// | `PERSESSION_PROXY` | `proxy` |
    ///
    /// Blank values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = env_non_empty(ENV_CACHE_PATH)
            .map_or_else(Self::default, |path| Self::new(PathBuf::from(path)));
        if let Some(key) = env_non_empty(ENV_KEY) {
            config.key = key;
        }
        config.encryption_key = env_non_empty(ENV_MASTER_KEY);
        config.user_agent = env_non_empty(ENV_USER_AGENT);
        config.proxy = env_non_empty(ENV_PROXY);
        config
    }

    /// Sets the session key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Replaces the default headers.
    #[must_use]
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Adds one default header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Sets the User-Agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Routes all traffic through `proxy`.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the redirect limit; 0 disables following redirects.
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sets the persist policy.
    #[must_use]
    pub fn with_persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.persist_policy = policy;
        self
    }

    /// Ignores cached state older than `max_age` at open.
    #[must_use]
    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = Some(max_age);
        self
    }

    /// Encrypts the cache file with a key derived from `material`.
    #[must_use]
    pub fn with_encryption_key(mut self, material: impl Into<String>) -> Self {
        self.encryption_key = Some(material.into());
        self
    }

    /// Validates config values.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.trim().is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if self.cache_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCachePath);
        }
        if self.cache_path.is_dir() {
            return Err(ConfigError::CachePathIsDirectory {
                path: self.cache_path.clone(),
            });
        }
        validate_timeout("connect_timeout", self.connect_timeout)?;
        validate_timeout("read_timeout", self.read_timeout)?;
        if let Some(user_agent) = &self.user_agent {
            HeaderValue::from_str(user_agent)
                .map_err(|e| ConfigError::invalid_header("user-agent", e))?;
        }
        if self
            .encryption_key
            .as_deref()
            .is_some_and(|key| key.is_empty())
        {
            return Err(ConfigError::EmptyEncryptionKey);
        }
        Ok(())
    }
}

fn validate_timeout(field: &'static str, value: Option<Duration>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.is_zero() || value > MAX_TIMEOUT {
        return Err(ConfigError::InvalidTimeout { field, value });
    }
    Ok(())
}

fn env_non_empty(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("/tmp/sessions.json");
        assert_eq!(config.key, "default");
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.persist_policy, PersistPolicy::AfterEachRequest);
        assert!(config.connect_timeout.is_none());
        assert!(config.read_timeout.is_none());
        assert!(config.cache_max_age.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_key() {
        let config = SessionConfig::new("/tmp/sessions.json").with_key("  ");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyKey)));
    }

    #[test]
    fn test_validate_rejects_directory_cache_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(dir.path());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CachePathIsDirectory { .. })
        ));
    }

    #[test]
    fn test_validate_timeout_range() {
        let zero = SessionConfig::new("/tmp/s.json").with_connect_timeout(Duration::ZERO);
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "connect_timeout",
                ..
            })
        ));

        let huge = SessionConfig::new("/tmp/s.json").with_read_timeout(Duration::from_secs(7200));
        assert!(huge.validate().is_err());

        let ok = SessionConfig::new("/tmp/s.json").with_read_timeout(Duration::from_secs(30));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_user_agent() {
        let config = SessionConfig::new("/tmp/s.json").with_user_agent("bad\nagent");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_encryption_key() {
        let config = SessionConfig::new("/tmp/s.json").with_encryption_key("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyEncryptionKey)
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = SessionConfig::new("/tmp/s.json")
            .with_encryption_key("hunter2")
            .with_proxy("http://user:pw@proxy:8080");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("user:pw"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("X-Token", "abc").unwrap();
        assert_eq!(name.as_str(), "x-token");
        assert_eq!(value, "abc");
        assert!(parse_header("bad header", "x").is_err());
    }

    #[test]
    fn test_persist_policy_labels() {
        assert_eq!(PersistPolicy::default().as_str(), "after-each-request");
        assert_eq!(PersistPolicy::Manual.as_str(), "manual");
    }
}
