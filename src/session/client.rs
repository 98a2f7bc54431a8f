//! reqwest client construction for sessions.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::cookie::SessionCookieJar;

/// Builds the HTTP client for a session.
///
/// The session jar is installed as cookie provider, so cookies set by any
/// response in a redirect chain are merged. Redirects follow
/// `config.max_redirects` (0 disables them). Without an explicit proxy,
/// reqwest's system proxy lookup is used; if that lookup panics the build is
/// retried with proxies read from `HTTPS_PROXY` / `HTTP_PROXY` / `ALL_PROXY`.
pub(crate) fn build_client(
    config: &SessionConfig,
    jar: Arc<SessionCookieJar>,
) -> Result<Client, reqwest::Error> {
    if let Some(result) = try_build_client(config, Arc::clone(&jar), false) {
        return result;
    }
    warn!(
        "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
    );
    match try_build_client(config, Arc::clone(&jar), true) {
        Some(result) => result,
        None => {
            warn!("env-proxy fallback panicked; building client without proxies");
            base_client_builder(config, jar)?.no_proxy().build()
        }
    }
}

// Suppresses the panic hook while a guarded build runs so expected recoveries
// do not print to stderr.
static PANIC_HOOK_LOCK: Mutex<()> = Mutex::new(());

/// Returns `None` when the builder panicked.
fn try_build_client(
    config: &SessionConfig,
    jar: Arc<SessionCookieJar>,
    env_proxy_only: bool,
) -> Option<Result<Client, reqwest::Error>> {
    let _guard = PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_client_builder(config, jar)?;
        if env_proxy_only && config.proxy.is_none() {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build()
    }));
    set_hook(previous_hook);
    outcome.ok()
}

fn base_client_builder(
    config: &SessionConfig,
    jar: Arc<SessionCookieJar>,
) -> Result<ClientBuilder, reqwest::Error> {
    let redirect = if config.max_redirects == 0 {
        Policy::none()
    } else {
        Policy::limited(config.max_redirects)
    };

    let mut builder = Client::builder()
        .cookie_provider(jar)
        .gzip(true)
        .redirect(redirect);
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = config.read_timeout {
        builder = builder.read_timeout(timeout);
    }
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }
    debug!(
        max_redirects = config.max_redirects,
        proxy = config.proxy.is_some(),
        "building session HTTP client"
    );
    Ok(builder)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
