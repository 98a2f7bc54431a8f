//! Login-state classification from HTTP responses.
//!
//! A response is classified into a [`LoginState`] using caller-supplied
//! [`ClassificationRules`]. Rules are checked in a fixed order and the first
//! match wins:
//!
//! 1. failure status codes → [`LoginState::LoggedOut`]
//! 2. success status codes → [`LoginState::LoggedIn`]
//! 3. failure body pattern → [`LoginState::LoggedOut`]
//! 4. success body pattern → [`LoginState::LoggedIn`]
//! 5. success URL pattern (final URL after redirects) → [`LoginState::LoggedIn`]
//! 6. otherwise → [`LoginState::Unknown`]
//!
//! Classification is conservative: without positive evidence the result is
//! `Unknown`, never `LoggedIn`.
//!
//! # Example
//!
//! ```
//! use persession::{ClassificationRules, LoginState, Response, classify};
//!
//! # fn example() -> Result<(), persession::RuleError> {
//! let rules = ClassificationRules::new()
//!     .failure_status(401)
//!     .success_body("Sign out")?;
//!
//! let url = url::Url::parse("https://example.com/account").unwrap();
//! let response = Response::new(200, url).with_body("<a href=/logout>Sign out</a>");
//! assert_eq!(classify(&response, &rules), LoginState::LoggedIn);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use tracing::debug;

use crate::response::Response;

/// Result of classifying a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Positive evidence of an authenticated session.
    LoggedIn,
    /// Positive evidence of an unauthenticated session or rejected credentials.
    LoggedOut,
    /// No rule matched.
    Unknown,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoggedIn => "logged in",
            Self::LoggedOut => "logged out",
            Self::Unknown => "unknown",
        })
    }
}

/// Invalid classification rule.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A rule pattern is not a valid regular expression.
    #[error("invalid {rule} pattern: {source}")]
    InvalidPattern {
        /// Which rule the pattern was for.
        rule: &'static str,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Caller-supplied evidence used to decide login state.
///
/// An empty rule set classifies every response as [`LoginState::Unknown`].
#[derive(Debug, Clone, Default)]
pub struct ClassificationRules {
    success_status_codes: BTreeSet<u16>,
    failure_status_codes: BTreeSet<u16>,
    success_body: Option<Regex>,
    failure_body: Option<Regex>,
    success_url: Option<Regex>,
}

impl ClassificationRules {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treats `status` as proof of being logged in.
    #[must_use]
    pub fn success_status(mut self, status: u16) -> Self {
        self.success_status_codes.insert(status);
        self
    }

    /// Treats every code in `statuses` as proof of being logged in.
    #[must_use]
    pub fn success_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.success_status_codes.extend(statuses);
        self
    }

    /// Treats `status` as proof of being logged out.
    #[must_use]
    pub fn failure_status(mut self, status: u16) -> Self {
        self.failure_status_codes.insert(status);
        self
    }

    /// Treats every code in `statuses` as proof of being logged out.
    #[must_use]
    pub fn failure_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.failure_status_codes.extend(statuses);
        self
    }

    /// Body regex whose match means logged in.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] for an invalid regex.
    pub fn success_body(mut self, pattern: &str) -> Result<Self, RuleError> {
        self.success_body = Some(compile("success body", pattern)?);
        Ok(self)
    }

    /// Body regex whose match means logged out.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] for an invalid regex.
    pub fn failure_body(mut self, pattern: &str) -> Result<Self, RuleError> {
        self.failure_body = Some(compile("failure body", pattern)?);
        Ok(self)
    }

    /// Final-URL regex whose match means logged in.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] for an invalid regex.
    pub fn success_url(mut self, pattern: &str) -> Result<Self, RuleError> {
        self.success_url = Some(compile("success URL", pattern)?);
        Ok(self)
    }

    /// Logged in when the body contains `text`, ignoring case.
    ///
    /// This is the success body rule: it replaces any pattern set with
    /// [`success_body`](Self::success_body), and a later `success_body` call
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] when the escaped text cannot be
    /// compiled, for example when it exceeds the regex size limit.
    pub fn body_contains(mut self, text: &str) -> Result<Self, RuleError> {
        self.success_body = Some(compile(
            "success body",
            &format!("(?i){}", regex::escape(text)),
        )?);
        Ok(self)
    }

    /// A 302 from the probed page means logged in.
    ///
    /// Only meaningful when the session does not follow redirects
    /// (`SessionConfig::with_max_redirects(0)`): login pages commonly bounce
    /// authenticated visitors elsewhere.
    #[must_use]
    pub fn redirect_means_logged_in() -> Self {
        Self::new().success_status(302)
    }

    /// Returns true when no rule is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.success_status_codes.is_empty()
            && self.failure_status_codes.is_empty()
            && self.success_body.is_none()
            && self.failure_body.is_none()
            && self.success_url.is_none()
    }

    /// Classifies `response`. See [`classify`].
    #[must_use]
    pub fn classify(&self, response: &Response) -> LoginState {
        classify(response, self)
    }
}

fn compile(rule: &'static str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidPattern { rule, source })
}

/// Classifies a response as logged in, logged out, or unknown.
///
/// Rules are evaluated in the order documented at module level; the first
/// matching rule decides.
#[must_use]
pub fn classify(response: &Response, rules: &ClassificationRules) -> LoginState {
    let status = response.status;

    if rules.failure_status_codes.contains(&status) {
        debug!(status, "failure status code matched");
        return LoginState::LoggedOut;
    }
    if rules.success_status_codes.contains(&status) {
        debug!(status, "success status code matched");
        return LoginState::LoggedIn;
    }

    if rules.failure_body.is_some() || rules.success_body.is_some() {
        let body = response.text();
        if rules
            .failure_body
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&body))
        {
            debug!("failure body pattern matched");
            return LoginState::LoggedOut;
        }
        if rules
            .success_body
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&body))
        {
            debug!("success body pattern matched");
            return LoginState::LoggedIn;
        }
    }

    if rules
        .success_url
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(response.final_url.as_str()))
    {
        debug!(url = %response.final_url, "success URL pattern matched");
        return LoginState::LoggedIn;
    }

    debug!(status, "no classification rule matched");
    LoginState::Unknown
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;

    fn response(status: u16, body: &str) -> Response {
        Response::new(status, Url::parse("https://example.com/login").unwrap()).with_body(body)
    }

    #[test]
    fn test_failure_status_beats_success_body() {
        let rules = ClassificationRules::new()
            .failure_status(401)
            .success_body("Welcome")
            .unwrap();
        assert_eq!(
            classify(&response(401, "Welcome back"), &rules),
            LoginState::LoggedOut
        );
    }

    #[test]
    fn test_failure_status_beats_success_status() {
        let rules = ClassificationRules::new()
            .success_status(200)
            .failure_status(200);
        assert_eq!(classify(&response(200, ""), &rules), LoginState::LoggedOut);
    }

    #[test]
    fn test_success_status_beats_failure_body() {
        let rules = ClassificationRules::new()
            .success_status(200)
            .failure_body("Invalid password")
            .unwrap();
        assert_eq!(
            classify(&response(200, "Invalid password"), &rules),
            LoginState::LoggedIn
        );
    }

    #[test]
    fn test_failure_body_beats_success_body() {
        let rules = ClassificationRules::new()
            .failure_body("(?i)invalid")
            .unwrap()
            .success_body("Welcome")
            .unwrap();
        assert_eq!(
            classify(&response(200, "Welcome! Invalid session."), &rules),
            LoginState::LoggedOut
        );
    }

    #[test]
    fn test_success_url_used_last() {
        let rules = ClassificationRules::new()
            .success_url(r"/dashboard$")
            .unwrap();
        let at_dashboard =
            Response::new(200, Url::parse("https://example.com/dashboard").unwrap());
        assert_eq!(classify(&at_dashboard, &rules), LoginState::LoggedIn);
        assert_eq!(classify(&response(200, ""), &rules), LoginState::Unknown);
    }

    #[test]
    fn test_no_match_is_unknown_never_logged_in() {
        let rules = ClassificationRules::new()
            .success_status(204)
            .failure_status(401)
            .success_body("Sign out")
            .unwrap();
        assert_eq!(
            classify(&response(200, "Hello there"), &rules),
            LoginState::Unknown
        );
        assert_eq!(
            classify(&response(200, "anything"), &ClassificationRules::new()),
            LoginState::Unknown
        );
    }

    #[test]
    fn test_body_contains_is_case_insensitive_literal() {
        let rules = ClassificationRules::new().body_contains("Log Out (1)").unwrap();
        assert_eq!(
            classify(&response(200, "<a>log out (1)</a>"), &rules),
            LoginState::LoggedIn
        );
        assert_eq!(
            classify(&response(200, "log out 1"), &rules),
            LoginState::Unknown
        );
    }

    #[test]
    fn test_body_contains_replaces_success_body() {
        let rules = ClassificationRules::new()
            .success_body("Dashboard")
            .unwrap()
            .body_contains("sign out")
            .unwrap();
        assert_eq!(
            classify(&response(200, "Dashboard"), &rules),
            LoginState::Unknown
        );
        assert_eq!(
            classify(&response(200, "SIGN OUT"), &rules),
            LoginState::LoggedIn
        );
    }

    #[test]
    fn test_body_contains_reports_oversized_text() {
        let text = "ab".repeat(1_000_000);
        let err = ClassificationRules::new().body_contains(&text).unwrap_err();
        assert!(matches!(
            err,
            RuleError::InvalidPattern {
                rule: "success body",
                ..
            }
        ));
    }

    #[test]
    fn test_redirect_preset() {
        let rules = ClassificationRules::redirect_means_logged_in();
        assert_eq!(classify(&response(302, ""), &rules), LoginState::LoggedIn);
        assert_eq!(classify(&response(200, ""), &rules), LoginState::Unknown);
    }

    #[test]
    fn test_invalid_pattern_reports_rule() {
        let error = ClassificationRules::new().success_body("(unclosed").unwrap_err();
        assert!(error.to_string().contains("success body"));
    }

    #[test]
    fn test_is_empty() {
        assert!(ClassificationRules::new().is_empty());
        assert!(!ClassificationRules::new().success_status(200).is_empty());
    }
}
