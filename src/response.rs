//! Typed HTTP response returned by session requests.

use std::borrow::Cow;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use crate::store::StorageError;

/// What happened to session state after an exchange.
#[derive(Debug, Default)]
pub enum PersistOutcome {
    /// Cookies and headers were written to the cache file.
    Saved,
    /// The session's persist policy did not call for a write.
    #[default]
    Skipped,
    /// The exchange succeeded but writing the cache file failed.
    Failed(StorageError),
}

/// A fully read HTTP response plus the session's persistence result.
///
/// The body is buffered so the login classifier and the caller can both read it.
#[derive(Debug)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers of the final response.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Vec<u8>,
    /// URL of the final response after redirects.
    pub final_url: Url,
    /// Names of cookies set by the final response.
    pub cookies_set: Vec<String>,
    /// Outcome of the post-exchange persistence step.
    pub persistence: PersistOutcome,
}

impl Response {
    /// Creates an empty response. Mostly useful for classifying responses
    /// obtained elsewhere and in tests.
    #[must_use]
    pub fn new(status: u16, final_url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
            final_url,
            cookies_set: Vec::new(),
            persistence: PersistOutcome::Skipped,
        }
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns true for 2xx status codes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true when the response arrived but session state could not be saved.
    #[must_use]
    pub fn persistence_failed(&self) -> bool {
        matches!(self.persistence, PersistOutcome::Failed(_))
    }

    /// The persistence error, if the post-exchange save failed.
    #[must_use]
    pub fn persistence_error(&self) -> Option<&StorageError> {
        match &self.persistence {
            PersistOutcome::Failed(error) => Some(error),
            PersistOutcome::Saved | PersistOutcome::Skipped => None,
        }
    }
}
