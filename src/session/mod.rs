//! Persistent HTTP session.
//!
//! A [`Session`] owns one slot (its session key) in a cache file. It loads
//! cookies and default headers from that slot when opened, sends requests
//! through a reqwest client whose cookie provider is the session's
//! [`SessionCookieJar`], and writes the updated state back after each exchange
//! according to its [`PersistPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use persession::{ClassificationRules, RequestBody, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new("/tmp/sessions.json", Some("alice"), None)?;
//! let rules = ClassificationRules::new()
//!     .failure_status(401)
//!     .success_body("Sign out")?;
//!
//! let outcome = session
//!     .login(
//!         "https://example.com/login",
//!         RequestBody::form([("user", "alice"), ("password", "secret")]),
//!         &rules,
//!     )
//!     .await?;
//! println!("login: {:?}", outcome.status());
//!
//! let page = session.get("https://example.com/account").await?;
//! println!("{}", page.text());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod login;
mod request;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use error::{SessionError, TransportError};
pub use login::{LoginOutcome, LoginStatus};
pub use request::{RequestBody, RequestOptions};

use crate::config::{ConfigError, PersistPolicy, SessionConfig};
use crate::cookie::{SessionCookieJar, StoredCookie, set_cookie_names, unix_now};
use crate::response::{PersistOutcome, Response};
use crate::store::{CachedBlob, CredentialStore, EncryptionKey, StorageError};
use crate::user_agent;

/// A persistent HTTP session bound to one key in a cache file.
///
/// All methods take `&self`; a session can be shared across tasks (for
/// example behind an `Arc`). Cookie merges are serialized by the jar and
/// persistence by an async mutex, so concurrent requests never lose each
/// other's cookies.
pub struct Session {
    key: String,
    store: CredentialStore,
    jar: Arc<SessionCookieJar>,
    headers: Mutex<HeaderMap>,
    client: Client,
    persist_policy: PersistPolicy,
    persist_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("store", &self.store)
            .field("cookies", &self.jar.len())
            .field("headers", &self.lock_headers().keys().collect::<Vec<_>>())
            .field("persist_policy", &self.persist_policy)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Opens the session `key` (default `"default"`) in `cache_path`.
    ///
    /// `default_headers` are sent with every request; cached headers only
    /// fill in names not given here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when the cache file exists but cannot
    /// be read or is corrupt. A missing file or key starts an empty session.
    pub fn new(
        cache_path: impl Into<PathBuf>,
        key: Option<&str>,
        default_headers: Option<HeaderMap>,
    ) -> Result<Self, SessionError> {
        let mut config = SessionConfig::new(cache_path);
        if let Some(key) = key {
            config.key = key.to_string();
        }
        if let Some(headers) = default_headers {
            config.default_headers = headers;
        }
        Self::open(config)
    }

    /// Opens a session from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for invalid configuration,
    /// [`SessionError::Storage`] when the cache cannot be read, and
    /// [`SessionError::ClientBuild`] when the HTTP client cannot be built.
    #[instrument(level = "debug", skip(config), fields(key = %config.key, cache = %config.cache_path.display()))]
    pub fn open(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let mut store = CredentialStore::new(&config.cache_path);
        if let Some(material) = &config.encryption_key {
            store = store.with_encryption_key(EncryptionKey::from_material(material));
        }

        let now = unix_now();
        let cached = store.load(&config.key)?.filter(|blob| {
            let stale = config
                .cache_max_age
                .is_some_and(|max_age| blob.is_older_than(max_age.as_secs(), now));
            if stale {
                info!(
                    key = %config.key,
                    saved_at = blob.saved_at,
                    "cached session older than max age; starting fresh"
                );
            }
            !stale
        });

        let (cookies, cached_headers) = match cached {
            Some(blob) => (blob.cookies, blob.headers),
            None => (Vec::new(), BTreeMap::new()),
        };
        let headers = initial_headers(
            &cached_headers,
            &config.default_headers,
            config.user_agent.as_deref(),
        )?;

        let jar = Arc::new(SessionCookieJar::from_cookies(cookies, now));
        let client = client::build_client(&config, Arc::clone(&jar))
            .map_err(SessionError::client_build)?;

        info!(
            key = %config.key,
            cookies = jar.len(),
            policy = config.persist_policy.as_str(),
            "session opened"
        );

        Ok(Self {
            key: config.key,
            store,
            jar,
            headers: Mutex::new(headers),
            client,
            persist_policy: config.persist_policy,
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Session key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cache file path.
    #[must_use]
    pub fn cache_path(&self) -> &Path {
        self.store.path()
    }

    /// Persist policy in effect.
    #[must_use]
    pub fn persist_policy(&self) -> PersistPolicy {
        self.persist_policy
    }

    /// Snapshot of the session's unexpired cookies.
    #[must_use]
    pub fn cookies(&self) -> Vec<StoredCookie> {
        self.jar.snapshot(unix_now())
    }

    /// Current default headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        self.lock_headers().clone()
    }

    /// Sets a default header. Persisted with the next save.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock_headers().insert(name, value);
    }

    /// Removes a default header, returning its previous value.
    pub fn remove_header(&self, name: &str) -> Option<HeaderValue> {
        self.lock_headers().remove(name)
    }

    /// Sends a request with the session's cookies and default headers.
    ///
    /// `options.headers` override default headers for this call only. Cookies
    /// set by any response in the redirect chain are merged into the jar.
    /// Depending on the persist policy the updated state is then saved; a
    /// failed save is reported through [`Response::persistence`] and does not
    /// discard the response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the URL is invalid or the exchange
    /// fails. Nothing is persisted in that case.
    #[instrument(level = "debug", skip(self, options), fields(key = %self.key, method = %method, url = %url))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, TransportError> {
        let RequestOptions {
            headers: overrides,
            params,
            body,
            timeout,
        } = options;

        let mut target =
            Url::parse(url).map_err(|e| TransportError::invalid_url(&method, url, e))?;
        if !params.is_empty() {
            target.query_pairs_mut().extend_pairs(params);
        }

        let mut headers = self.headers();
        for (name, value) in &overrides {
            headers.insert(name.clone(), value.clone());
        }

        let mut payload = None;
        if let Some(body) = body {
            if let Some(content_type) = body.content_type()
                && !headers.contains_key(CONTENT_TYPE)
            {
                headers.insert(CONTENT_TYPE, content_type);
            }
            payload = Some(body.into_bytes());
        }

        let mut builder = self
            .client
            .request(method.clone(), target.clone())
            .headers(headers);
        if let Some(bytes) = payload {
            builder = builder.body(bytes);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let reply = builder
            .send()
            .await
            .map_err(|e| TransportError::send(&method, target.as_str(), e))?;

        let status = reply.status().as_u16();
        let final_url = reply.url().clone();
        let response_headers = reply.headers().clone();
        let body = reply
            .bytes()
            .await
            .map_err(|e| TransportError::body(&method, target.as_str(), e))?;
        let cookies_set = set_cookie_names(&response_headers);

        debug!(
            status,
            final_url = %final_url,
            cookies_set = cookies_set.len(),
            "exchange completed"
        );

        let persistence = if should_persist(self.persist_policy, &method) {
            self.persist_outcome().await
        } else {
            PersistOutcome::Skipped
        };

        Ok(Response {
            status,
            headers: response_headers,
            body: body.to_vec(),
            final_url,
            cookies_set,
            persistence,
        })
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`Session::request`].
    pub async fn get(&self, url: &str) -> Result<Response, TransportError> {
        self.request(Method::GET, url, RequestOptions::new()).await
    }

    /// Sends a HEAD request.
    ///
    /// # Errors
    ///
    /// See [`Session::request`].
    pub async fn head(&self, url: &str) -> Result<Response, TransportError> {
        self.request(Method::HEAD, url, RequestOptions::new()).await
    }

    /// Sends a DELETE request.
    ///
    /// # Errors
    ///
    /// See [`Session::request`].
    pub async fn delete(&self, url: &str) -> Result<Response, TransportError> {
        self.request(Method::DELETE, url, RequestOptions::new()).await
    }

    /// Sends a POST request with `body`.
    ///
    /// # Errors
    ///
    /// See [`Session::request`].
    pub async fn post(&self, url: &str, body: RequestBody) -> Result<Response, TransportError> {
        self.request(Method::POST, url, body.into()).await
    }

    /// Sends a PUT request with `body`.
    ///
    /// # Errors
    ///
    /// See [`Session::request`].
    pub async fn put(&self, url: &str, body: RequestBody) -> Result<Response, TransportError> {
        self.request(Method::PUT, url, body.into()).await
    }

    /// Sends a PATCH request with `body`.
    ///
    /// # Errors
    ///
    /// See [`Session::request`].
    pub async fn patch(&self, url: &str, body: RequestBody) -> Result<Response, TransportError> {
        self.request(Method::PATCH, url, body.into()).await
    }

    /// Writes the current cookies and default headers to the cache file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the cache file cannot be written.
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.persist().await
    }

    /// Drops all cookies and removes this session's key from the cache file.
    ///
    /// Default headers stay in memory. Returns whether the key was present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the cache file cannot be updated.
    #[instrument(level = "debug", skip(self), fields(key = %self.key))]
    pub async fn clear(&self) -> Result<bool, StorageError> {
        let _guard = self.persist_lock.lock().await;
        self.jar.clear();
        let removed = self.store.delete(&self.key)?;
        info!(key = %self.key, removed, "session cleared");
        Ok(removed)
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().await;
        let blob = CachedBlob::new(
            self.jar.snapshot(unix_now()),
            headers_to_map(&self.lock_headers()),
        );
        self.store.save(&self.key, &blob)?;
        debug!(key = %self.key, cookies = blob.cookies.len(), "session persisted");
        Ok(())
    }

    async fn persist_outcome(&self) -> PersistOutcome {
        match self.persist().await {
            Ok(()) => PersistOutcome::Saved,
            Err(error) => {
                warn!(key = %self.key, error = %error, "failed to persist session state");
                PersistOutcome::Failed(error)
            }
        }
    }

    fn lock_headers(&self) -> MutexGuard<'_, HeaderMap> {
        self.headers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn should_persist(policy: PersistPolicy, method: &Method) -> bool {
    match policy {
        PersistPolicy::AfterEachRequest => true,
        PersistPolicy::AfterEachPost => *method == Method::POST,
        PersistPolicy::AfterEachLogin | PersistPolicy::Manual => false,
    }
}

/// Layers headers: built-in User-Agent, then cached headers, then caller
/// defaults, then an explicit User-Agent.
fn initial_headers(
    cached: &BTreeMap<String, String>,
    defaults: &HeaderMap,
    user_agent: Option<&str>,
) -> Result<HeaderMap, SessionError> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&user_agent::default_user_agent()) {
        headers.insert(USER_AGENT, value);
    }

    for (name, value) in cached {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid cached header"),
        }
    }

    for name in defaults.keys() {
        headers.remove(name);
        for value in defaults.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    if let Some(user_agent) = user_agent {
        let value = HeaderValue::from_str(user_agent).map_err(|e| {
            SessionError::Config(ConfigError::invalid_header("user-agent", e))
        })?;
        headers.insert(USER_AGENT, value);
    }
    Ok(headers)
}

/// Flattens headers for storage. Repeated headers are joined with `", "`.
fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if values.is_empty() {
            debug!(header = %name, "skipping non-text header when persisting");
            continue;
        }
        map.insert(name.as_str().to_string(), values.join(", "));
    }
    map
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cached(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_initial_headers_default_user_agent() {
        let headers = initial_headers(&BTreeMap::new(), &HeaderMap::new(), None).unwrap();
        assert!(
            headers[USER_AGENT]
                .to_str()
                .unwrap()
                .starts_with("persession/")
        );
    }

    #[test]
    fn test_initial_headers_caller_beats_cache() {
        let mut defaults = HeaderMap::new();
        defaults.insert("x-team", HeaderValue::from_static("caller"));
        let headers = initial_headers(
            &cached(&[("x-team", "cached"), ("x-token", "abc")]),
            &defaults,
            None,
        )
        .unwrap();
        assert_eq!(headers["x-team"], "caller");
        assert_eq!(headers["x-token"], "abc");
    }

    #[test]
    fn test_initial_headers_explicit_user_agent_wins() {
        let mut defaults = HeaderMap::new();
        defaults.insert(USER_AGENT, HeaderValue::from_static("from-defaults"));
        let headers = initial_headers(
            &cached(&[("user-agent", "from-cache")]),
            &defaults,
            Some("explicit"),
        )
        .unwrap();
        assert_eq!(headers[USER_AGENT], "explicit");
    }

    #[test]
    fn test_initial_headers_skips_invalid_cached_entries() {
        let headers =
            initial_headers(&cached(&[("bad header", "x")]), &HeaderMap::new(), None).unwrap();
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_headers_to_map_joins_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        let map = headers_to_map(&headers);
        assert_eq!(map["accept"], "text/html, application/json");
    }

    #[test]
    fn test_should_persist_by_policy() {
        assert!(should_persist(PersistPolicy::AfterEachRequest, &Method::GET));
        assert!(should_persist(PersistPolicy::AfterEachPost, &Method::POST));
        assert!(!should_persist(PersistPolicy::AfterEachPost, &Method::GET));
        assert!(!should_persist(PersistPolicy::AfterEachLogin, &Method::POST));
        assert!(!should_persist(PersistPolicy::Manual, &Method::POST));
    }

    #[test]
    fn test_open_starts_empty_without_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path().join("sessions.json"), None, None).unwrap();
        assert_eq!(session.key(), "default");
        assert!(session.cookies().is_empty());
        assert!(session.headers().contains_key(USER_AGENT));
    }

    #[test]
    fn test_open_fails_on_corrupt_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{not json").unwrap();
        let error = Session::new(&path, Some("k"), None).unwrap_err();
        assert!(matches!(error, SessionError::Storage(ref e) if e.is_corruption()));
    }

    #[test]
    fn test_set_and_remove_header() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path().join("s.json"), None, None).unwrap();
        session.set_header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static("k1"),
        );
        assert_eq!(session.headers()["x-api-key"], "k1");
        assert_eq!(session.remove_header("x-api-key").unwrap(), "k1");
        assert!(session.remove_header("x-api-key").is_none());
    }
}
