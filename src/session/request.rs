//! Per-call request options.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
    /// Serialized JSON document.
    Json(Vec<u8>),
    /// Raw bytes with an optional content type.
    Raw {
        /// Body bytes.
        bytes: Vec<u8>,
        /// `Content-Type` to send, if any.
        content_type: Option<HeaderValue>,
    },
}

impl RequestBody {
    /// Form body from key/value pairs.
    pub fn form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::Json)
    }

    /// Raw body without a content type.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Raw {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    /// Content type implied by the body kind.
    pub(crate) fn content_type(&self) -> Option<HeaderValue> {
        match self {
            Self::Form(_) => Some(HeaderValue::from_static(FORM_CONTENT_TYPE)),
            Self::Json(_) => Some(HeaderValue::from_static(JSON_CONTENT_TYPE)),
            Self::Raw { content_type, .. } => content_type.clone(),
        }
    }

    /// Encoded body bytes.
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields)
                .finish()
                .into_bytes(),
            Self::Json(bytes) | Self::Raw { bytes, .. } => bytes,
        }
    }
}

/// Options for a single request.
///
/// Headers given here override the session's default headers for this call
/// only and are never persisted.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Per-call header overrides.
    pub headers: HeaderMap,
    /// Query parameters appended to the URL.
    pub params: Vec<(String, String)>,
    /// Request body.
    pub body: Option<RequestBody>,
    /// Total timeout for this call.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header override.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a timeout for this call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<RequestBody> for RequestOptions {
    fn from(body: RequestBody) -> Self {
        Self::new().body(body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_form_body_is_url_encoded() {
        let body = RequestBody::form([("user", "ada lovelace"), ("pass", "a&b=c")]);
        assert_eq!(body.content_type().unwrap(), FORM_CONTENT_TYPE);
        assert_eq!(
            String::from_utf8(body.into_bytes()).unwrap(),
            "user=ada+lovelace&pass=a%26b%3Dc"
        );
    }

    #[test]
    fn test_json_body() {
        let body = RequestBody::json(&serde_json::json!({"user": "ada"})).unwrap();
        assert_eq!(body.content_type().unwrap(), JSON_CONTENT_TYPE);
        assert_eq!(body.into_bytes(), br#"{"user":"ada"}"#);
    }

    #[test]
    fn test_raw_body_has_no_content_type() {
        let body = RequestBody::raw("payload");
        assert!(body.content_type().is_none());
        assert_eq!(body.into_bytes(), b"payload");
    }

    #[test]
    fn test_options_builder() {
        let options = RequestOptions::new()
            .header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("1"),
            )
            .param("page", "2")
            .timeout(Duration::from_secs(3));
        assert_eq!(options.headers["x-trace"], "1");
        assert_eq!(options.params, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
        assert!(options.body.is_none());
    }
}
