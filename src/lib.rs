//! Persistent HTTP sessions.
//!
//! `persession` keeps an HTTP session's cookies and default headers in a
//! cache file so a login survives process restarts, and classifies responses
//! into logged in / logged out / unknown using caller-supplied rules.
//!
//! # Architecture
//!
//! - [`cookie`] - cookie model, `Set-Cookie` parsing, and the session jar
//! - [`store`] - the keyed, optionally encrypted cache file
//! - [`session`] - the HTTP facade, login flow, and probes
//! - [`classify`] - login-state classification rules
//! - [`config`] - session configuration and environment overrides
//! - [`response`] - the typed response returned by every request

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod cookie;
pub mod response;
pub mod session;
pub mod store;

mod user_agent;

// Re-export commonly used types
pub use classify::{ClassificationRules, LoginState, RuleError, classify};
pub use config::{ConfigError, PersistPolicy, SessionConfig};
pub use cookie::{SessionCookieJar, StoredCookie};
pub use response::{PersistOutcome, Response};
pub use session::{
    LoginOutcome, LoginStatus, RequestBody, RequestOptions, Session, SessionError, TransportError,
};
pub use store::{
    CachedBlob, CredentialStore, EncryptionKey, StorageError, StoreOperation, default_cache_path,
};
