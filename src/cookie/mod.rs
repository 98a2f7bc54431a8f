//! Cookie jar for persistent sessions.
//!
//! This module provides the session's cookie model and the jar that reqwest
//! consults on every request:
//! - [`StoredCookie`] - one cookie with domain/path scope and absolute expiry
//! - [`parse_set_cookie`] - `Set-Cookie` header parsing relative to a request URL
//! - [`SessionCookieJar`] - thread-safe cookie set implementing
//!   [`reqwest::cookie::CookieStore`]

mod jar;
mod parse;

use std::time::{SystemTime, UNIX_EPOCH};

pub use jar::SessionCookieJar;
pub use parse::{SetCookieError, StoredCookie, parse_set_cookie, set_cookie_names};

/// Current time as Unix seconds (0 if the clock is before the epoch).
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
