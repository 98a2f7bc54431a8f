//! Default User-Agent sent by sessions that do not configure one.

/// Default User-Agent for session requests.
///
/// The repository URL is advertised only when the package manifest declares
/// one.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match env!("CARGO_PKG_REPOSITORY") {
        "" => format!("persession/{version}"),
        repository => format!("persession/{version} (+{repository})"),
    }
}
