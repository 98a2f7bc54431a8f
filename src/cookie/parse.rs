//! `Set-Cookie` parsing and the stored cookie representation.
//!
//! Cookies are scoped by domain and path, and carry expiry as an absolute Unix
//! timestamp so a cached session survives arbitrary gaps between runs.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// A single cookie held by a session jar and written to the cache file.
///
/// The value is redacted in Debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value. Never logged.
    value: String,
    /// Lowercase domain without a leading dot.
    pub domain: String,
    /// Whether the cookie only matches `domain` exactly (no `Domain` attribute was sent).
    #[serde(default)]
    pub host_only: bool,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Whether the cookie should only be sent over secure connections.
    #[serde(default)]
    pub secure: bool,
    /// Whether the server marked the cookie `HttpOnly`.
    #[serde(default)]
    pub http_only: bool,
    /// Absolute expiry as Unix seconds (`None` = session cookie).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}

impl StoredCookie {
    /// Creates a domain cookie with no expiry.
    ///
    /// A leading dot on `domain` is dropped and the domain is lowercased.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let domain = domain.into();
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only: false,
            path: path.into(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    /// Sets the absolute expiry (Unix seconds).
    #[must_use]
    pub fn with_expires(mut self, expires: u64) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Restricts the cookie to an exact host match.
    #[must_use]
    pub fn with_host_only(mut self, host_only: bool) -> Self {
        self.host_only = host_only;
        self
    }

    /// Marks the cookie as secure-only.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Marks the cookie as `HttpOnly`.
    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Returns the cookie value.
    ///
    /// Do not log the returned value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the expiry is at or before `now` (Unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Returns true when two cookies occupy the same jar slot (name + domain + path).
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// Returns true when this cookie should be sent with a request to `url`.
    ///
    /// Expiry is not checked here; the jar filters expired cookies separately.
    #[must_use]
    pub fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };

        domain_ok && path_matches(url.path(), &self.path) && (!self.secure || is_secure(url))
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for StoredCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("host_only", &self.host_only)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .finish()
    }
}

/// Reasons a `Set-Cookie` header is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetCookieError {
    /// The header has no `name=value` pair before the first `;`.
    #[error("Set-Cookie header has no name=value pair")]
    MissingPair,
    /// The cookie name is empty.
    #[error("Set-Cookie header has an empty cookie name")]
    EmptyName,
    /// The request URL has no host to scope the cookie to.
    #[error("request URL has no host")]
    NoHost,
    /// The `Domain` attribute does not cover the request host.
    #[error("cookie domain '{domain}' does not match request host '{host}'")]
    DomainMismatch {
        /// Domain named by the attribute.
        domain: String,
        /// Host the response came from.
        host: String,
    },
}

/// Parses a `Set-Cookie` header value received from `request_url`.
///
/// `Max-Age` takes precedence over `Expires`. A non-positive `Max-Age` or a
/// past `Expires` yields a cookie that is already expired at `now`; the jar
/// treats such cookies as deletions.
///
/// # Errors
///
/// Returns [`SetCookieError`] when the header has no usable name, the URL has
/// no host, or the `Domain` attribute does not cover the request host.
pub fn parse_set_cookie(
    header: &str,
    request_url: &Url,
    now: u64,
) -> Result<StoredCookie, SetCookieError> {
    let mut parts = header.split(';');
    let pair = parts.next().unwrap_or_default().trim();
    let Some((name, value)) = pair.split_once('=') else {
        return Err(SetCookieError::MissingPair);
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(SetCookieError::EmptyName);
    }

    let host = request_url
        .host_str()
        .ok_or(SetCookieError::NoHost)?
        .to_ascii_lowercase();

    let mut domain_attr = None;
    let mut path_attr = None;
    let mut expires_attr = None;
    let mut max_age = None;
    let mut secure = false;
    let mut http_only = false;

    for attribute in parts {
        let (key, attr_value) = match attribute.split_once('=') {
            Some((key, attr_value)) => (key.trim(), attr_value.trim()),
            None => (attribute.trim(), ""),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" => {
                let domain = attr_value.trim_start_matches('.').to_ascii_lowercase();
                if !domain.is_empty() {
                    domain_attr = Some(domain);
                }
            }
            "path" => {
                if attr_value.starts_with('/') {
                    path_attr = Some(attr_value.to_string());
                }
            }
            "expires" => match parse_cookie_date(attr_value) {
                Some(timestamp) => expires_attr = Some(timestamp),
                None => {
                    debug!(cookie = %name, "unparseable Expires attribute; treating as expired");
                    expires_attr = Some(0);
                }
            },
            "max-age" => match attr_value.parse::<i64>() {
                Ok(seconds) => max_age = Some(seconds),
                Err(_) => debug!(cookie = %name, "ignoring unparseable Max-Age attribute"),
            },
            "secure" => secure = true,
            "httponly" => http_only = true,
            _ => {}
        }
    }

    let (domain, host_only) = match domain_attr {
        Some(domain) => {
            if !domain_matches(&host, &domain) {
                return Err(SetCookieError::DomainMismatch { domain, host });
            }
            (domain, false)
        }
        None => (host, true),
    };

    let expires = match max_age {
        Some(seconds) if seconds <= 0 => Some(0),
        Some(seconds) => Some(now.saturating_add(seconds.unsigned_abs())),
        None => expires_attr,
    };

    Ok(StoredCookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        domain,
        host_only,
        path: path_attr.unwrap_or_else(|| default_path(request_url)),
        secure,
        http_only,
        expires,
    })
}

/// Returns the names of cookies set by a response's `Set-Cookie` headers.
#[must_use]
pub fn set_cookie_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, _) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Domain matching: exact host, or a dotted suffix of a non-IP host.
pub(crate) fn domain_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    host.strip_suffix(domain)
        .is_some_and(|prefix| prefix.ends_with('.'))
        && host.parse::<std::net::IpAddr>().is_err()
}

/// Path matching: identical, or `cookie_path` is a `/`-bounded prefix.
pub(crate) fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path
        .strip_prefix(cookie_path)
        .is_some_and(|rest| rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'))
}

/// Default cookie path: the request path up to, not including, its last `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Secure contexts are HTTPS and loopback hosts.
fn is_secure(url: &Url) -> bool {
    url.scheme() == "https" || matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

/// Parses an `Expires` value into Unix seconds.
///
/// Strict HTTP-dates go through `httpdate`; anything else falls back to the
/// lenient cookie-date grammar of RFC 6265 section 5.1.1, which covers the
/// Netscape forms (`Thu, 01-Jan-70 00:00:01 GMT`), two-digit years, and zone
/// names other than `GMT`. Dates before the epoch map to 0.
fn parse_cookie_date(value: &str) -> Option<u64> {
    match httpdate::parse_http_date(value) {
        Ok(parsed) => Some(unix_seconds(parsed)),
        Err(_) => parse_lenient_cookie_date(value),
    }
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn is_date_delimiter(c: char) -> bool {
    matches!(c, '\t' | ' '..='/' | ';'..='@' | '['..='`' | '{'..='~')
}

/// Leading run of 1 to `max` ASCII digits, rejected when more digits follow.
fn leading_digits(token: &str, min: usize, max: usize) -> Option<(u32, &str)> {
    let len = token.bytes().take_while(u8::is_ascii_digit).count();
    if len < min || len > max {
        return None;
    }
    let (digits, rest) = token.split_at(len);
    Some((digits.parse().ok()?, rest))
}

fn parse_time_token(token: &str) -> Option<(u32, u32, u32)> {
    let (hour, rest) = leading_digits(token, 1, 2)?;
    let (minute, rest) = leading_digits(rest.strip_prefix(':')?, 1, 2)?;
    let (second, _) = leading_digits(rest.strip_prefix(':')?, 1, 2)?;
    Some((hour, minute, second))
}

fn parse_lenient_cookie_date(value: &str) -> Option<u64> {
    let mut time = None;
    let mut day = None;
    let mut month = None;
    let mut year = None;

    for token in value.split(is_date_delimiter).filter(|t| !t.is_empty()) {
        if time.is_none()
            && let Some(parsed) = parse_time_token(token)
        {
            time = Some(parsed);
        } else if day.is_none()
            && let Some((parsed, _)) = leading_digits(token, 1, 2)
        {
            day = Some(parsed);
        } else if month.is_none()
            && let Some(number) = token.get(..3).and_then(|prefix| {
                MONTHS
                    .iter()
                    .position(|name| prefix.eq_ignore_ascii_case(name))
                    .and_then(|index| u32::try_from(index + 1).ok())
            })
        {
            month = Some(number);
        } else if year.is_none()
            && let Some((parsed, _)) = leading_digits(token, 2, 4)
        {
            year = Some(parsed);
        }
    }

    let (hour, minute, second) = time?;
    let (day, month) = (day?, month?);
    let year = match year? {
        y @ 70..=99 => y + 1900,
        y @ 0..=69 => y + 2000,
        y => y,
    };

    if year < 1601
        || hour > 23
        || minute > 59
        || second > 59
        || day == 0
        || day > days_in_month(year, month)
    {
        return None;
    }

    let seconds = days_from_civil(year, month, day) * 86_400
        + i64::from(hour) * 3_600
        + i64::from(minute) * 60
        + i64::from(second);
    Some(u64::try_from(seconds).unwrap_or(0))
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: u32, month: u32, day: u32) -> i64 {
    let year = i64::from(year) - i64::from(month <= 2);
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month = i64::from(month);
    let day_of_year = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5
        + i64::from(day)
        - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
