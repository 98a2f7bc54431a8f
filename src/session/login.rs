//! Login flow and login-state probes.

use std::fmt;

use reqwest::Method;
use tracing::{info, instrument};

use super::Session;
use super::error::TransportError;
use super::request::{RequestBody, RequestOptions};
use crate::classify::{ClassificationRules, LoginState};
use crate::config::PersistPolicy;
use crate::response::Response;

const FAILURE_REASON: &str = "server rejected credentials or classifier matched failure pattern";
const UNKNOWN_REASON: &str = "no classification rule matched";

/// Result of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// The response carried positive evidence of being logged in.
    Success,
    /// The response carried positive evidence of rejection.
    Failure,
    /// No rule matched.
    Unknown,
}

impl From<LoginState> for LoginStatus {
    fn from(state: LoginState) -> Self {
        match state {
            LoginState::LoggedIn => Self::Success,
            LoginState::LoggedOut => Self::Failure,
            LoginState::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Unknown => "unknown",
        })
    }
}

/// Outcome of [`Session::login`]: the status, the login response, and a
/// reason for anything other than success.
#[derive(Debug)]
pub struct LoginOutcome {
    status: LoginStatus,
    response: Response,
    reason: Option<&'static str>,
}

impl LoginOutcome {
    fn new(status: LoginStatus, response: Response) -> Self {
        let reason = match status {
            LoginStatus::Success => None,
            LoginStatus::Failure => Some(FAILURE_REASON),
            LoginStatus::Unknown => Some(UNKNOWN_REASON),
        };
        Self {
            status,
            response,
            reason,
        }
    }

    /// Login status.
    #[must_use]
    pub fn status(&self) -> LoginStatus {
        self.status
    }

    /// Returns true for [`LoginStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LoginStatus::Success
    }

    /// The login response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Why the login did not succeed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason
    }

    /// Consumes the outcome, returning the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

impl Session {
    /// POSTs `credentials` to `url` and classifies the response.
    ///
    /// Cookies from the response are merged whatever the outcome; a failed
    /// login never rolls back the jar. No retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the exchange fails. An unclassifiable
    /// response is [`LoginStatus::Unknown`], not an error.
    pub async fn login(
        &self,
        url: &str,
        credentials: RequestBody,
        rules: &ClassificationRules,
    ) -> Result<LoginOutcome, TransportError> {
        self.login_with_options(Method::POST, url, credentials.into(), rules)
            .await
    }

    /// Login with an explicit method and full request options.
    ///
    /// Under [`PersistPolicy::AfterEachLogin`] the session is saved after a
    /// successful login and the result recorded in the outcome's response.
    ///
    /// # Errors
    ///
    /// See [`Session::login`].
    #[instrument(level = "debug", skip(self, options, rules), fields(key = %self.key(), method = %method, url = %url))]
    pub async fn login_with_options(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
        rules: &ClassificationRules,
    ) -> Result<LoginOutcome, TransportError> {
        let mut response = self.request(method, url, options).await?;
        let status = LoginStatus::from(rules.classify(&response));

        if status == LoginStatus::Success && self.persist_policy() == PersistPolicy::AfterEachLogin
        {
            response.persistence = self.persist_outcome().await;
        }

        info!(
            key = %self.key(),
            status = %status,
            http_status = response.status,
            "login attempt classified"
        );
        Ok(LoginOutcome::new(status, response))
    }

    /// GETs `probe_url` and classifies the response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the probe request fails.
    #[instrument(level = "debug", skip(self, rules), fields(key = %self.key()))]
    pub async fn probe(
        &self,
        probe_url: &str,
        rules: &ClassificationRules,
    ) -> Result<LoginState, TransportError> {
        let response = self.get(probe_url).await?;
        let state = rules.classify(&response);
        info!(key = %self.key(), state = %state, "login probe classified");
        Ok(state)
    }

    /// Returns true only when a probe classifies as logged in.
    ///
    /// Both [`LoginState::LoggedOut`] and [`LoginState::Unknown`] yield
    /// `false`, so "definitely logged out" and "could not tell" are
    /// indistinguishable here. Use [`Session::probe`] to tell them apart.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the probe request fails.
    pub async fn is_logged_in(
        &self,
        probe_url: &str,
        rules: &ClassificationRules,
    ) -> Result<bool, TransportError> {
        Ok(self.probe(probe_url, rules).await? == LoginState::LoggedIn)
    }
}
