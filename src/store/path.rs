//! Default cache file location.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

const CACHE_DIR_NAME: &str = "persession";
const CACHE_FILE_NAME: &str = "sessions.json";

/// Returns the default cache file path.
///
/// Priority:
/// 1. `$XDG_CACHE_HOME/persession/sessions.json`
/// 2. `$HOME/.cache/persession/sessions.json`
/// 3. `%LOCALAPPDATA%\persession\sessions.json`
/// 4. `<system temp dir>/persession/sessions.json`
#[must_use]
pub fn default_cache_path() -> PathBuf {
    resolve_cache_dir(
        sanitize_env_path(env::var_os("XDG_CACHE_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("LOCALAPPDATA")),
    )
    .join(CACHE_FILE_NAME)
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_cache_dir(
    xdg_cache_home: Option<PathBuf>,
    home: Option<PathBuf>,
    local_app_data: Option<PathBuf>,
) -> PathBuf {
    if let Some(xdg) = xdg_cache_home {
        return xdg.join(CACHE_DIR_NAME);
    }
    if let Some(home) = home {
        return home.join(".cache").join(CACHE_DIR_NAME);
    }
    if let Some(local_app_data) = local_app_data {
        return local_app_data.join(CACHE_DIR_NAME);
    }

    env::temp_dir().join(CACHE_DIR_NAME)
}
