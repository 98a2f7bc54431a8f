//! Error types for session operations.

use reqwest::Method;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StorageError;

/// A request could not be completed.
///
/// Transport errors are never retried or swallowed by the session; the
/// underlying reqwest error is kept as the source.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request URL could not be parsed.
    #[error("invalid URL for {method} {url}: {source}")]
    InvalidUrl {
        /// Request method.
        method: Method,
        /// The URL as given.
        url: String,
        /// The parse error.
        #[source]
        source: url::ParseError,
    },

    /// The request timed out.
    #[error("timeout during {method} {url}")]
    Timeout {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Connection, TLS, redirect, or protocol failure.
    #[error("network error during {method} {url}: {source}")]
    Network {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be read.
    #[error("failed reading response body of {method} {url}: {source}")]
    Body {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Creates an invalid URL error.
    pub fn invalid_url(method: &Method, url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            method: method.clone(),
            url: url.into(),
            source,
        }
    }

    /// Classifies a send failure as timeout or network error.
    pub fn send(method: &Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                method: method.clone(),
                url: url.into(),
                source,
            }
        } else {
            Self::Network {
                method: method.clone(),
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a body read error. Timeouts while streaming the body are
    /// reported as [`TransportError::Timeout`].
    pub fn body(method: &Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::send(method, url, source);
        }
        Self::Body {
            method: method.clone(),
            url: url.into(),
            source,
        }
    }

    /// Returns true for timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The URL of the failed request.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::Timeout { url, .. }
            | Self::Network { url, .. }
            | Self::Body { url, .. } => url,
        }
    }
}

/// Errors from opening or maintaining a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the cache file failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A request failed.
    ///
    /// Request methods return [`TransportError`] directly; this variant lets
    /// callers that open a session and send requests in one function
    /// propagate both with `?`.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session configuration is invalid.
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built (bad proxy URL, TLS backend failure).
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl SessionError {
    /// Creates a client build error.
    pub fn client_build(source: reqwest::Error) -> Self {
        Self::ClientBuild { source }
    }
}
