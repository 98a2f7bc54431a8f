//! Thread-safe cookie set used as reqwest's cookie provider.

use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use tracing::{debug, warn};
use url::Url;

use super::parse::{StoredCookie, parse_set_cookie};
use super::unix_now;

/// Cookie jar shared between a session and its HTTP client.
///
/// Merges are serialized by an internal mutex, so concurrent responses on the
/// same session never lose each other's cookies. Cookies are replaced by
/// name + domain + path, and expired cookies are dropped against the merge time.
#[derive(Debug, Default)]
pub struct SessionCookieJar {
    cookies: Mutex<Vec<StoredCookie>>,
}

impl SessionCookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar from previously stored cookies, dropping any that expired by `now`.
    #[must_use]
    pub fn from_cookies(cookies: impl IntoIterator<Item = StoredCookie>, now: u64) -> Self {
        let mut merged = Vec::new();
        for cookie in cookies {
            apply_cookie(&mut merged, cookie, now);
        }
        Self {
            cookies: Mutex::new(merged),
        }
    }

    /// Inserts or replaces a cookie.
    ///
    /// Returns `false` when the cookie was already expired at `now`, in which
    /// case any cookie with the same identity is removed instead.
    pub fn insert(&self, cookie: StoredCookie, now: u64) -> bool {
        let mut cookies = self.lock();
        apply_cookie(&mut cookies, cookie, now)
    }

    /// Merges raw `Set-Cookie` header values received from `url`.
    ///
    /// Rejected headers are logged and skipped. Returns the names of cookies
    /// that were stored (deletions are not included).
    pub fn merge_set_cookie_headers<'a, I>(&self, headers: I, url: &Url, now: u64) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cookies = self.lock();
        let mut stored = Vec::new();

        for header in headers {
            match parse_set_cookie(header, url, now) {
                Ok(cookie) => {
                    let name = cookie.name.clone();
                    if apply_cookie(&mut cookies, cookie, now) {
                        stored.push(name);
                    } else {
                        debug!(cookie = %name, "cookie expired by response; removed from jar");
                    }
                }
                Err(error) => {
                    warn!(url = %url, reason = %error, "skipping rejected Set-Cookie header");
                }
            }
        }

        cookies.retain(|cookie| !cookie.is_expired(now));
        stored
    }

    /// Returns the cookies that are still valid at `now`.
    #[must_use]
    pub fn snapshot(&self, now: u64) -> Vec<StoredCookie> {
        self.lock()
            .iter()
            .filter(|cookie| !cookie.is_expired(now))
            .cloned()
            .collect()
    }

    /// Builds the `Cookie` request header for `url`, longest paths first.
    #[must_use]
    pub fn cookie_header(&self, url: &Url, now: u64) -> Option<String> {
        let cookies = self.lock();
        let mut matching: Vec<&StoredCookie> = cookies
            .iter()
            .filter(|cookie| !cookie.is_expired(now) && cookie.matches_url(url))
            .collect();
        if matching.is_empty() {
            return None;
        }

        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value()))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Removes every cookie.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cookies currently held (including any not yet purged).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredCookie>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers = cookie_headers.filter_map(|value| value.to_str().ok());
        let stored = self.merge_set_cookie_headers(headers, url, unix_now());
        if !stored.is_empty() {
            debug!(url = %url, cookies = ?stored, "merged response cookies");
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self.cookie_header(url, unix_now())?;
        HeaderValue::from_str(&header).ok()
    }
}

fn apply_cookie(cookies: &mut Vec<StoredCookie>, cookie: StoredCookie, now: u64) -> bool {
    cookies.retain(|existing| !existing.same_identity(&cookie));
    if cookie.is_expired(now) {
        return false;
    }
    cookies.push(cookie);
    true
}
