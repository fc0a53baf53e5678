//! Small helpers shared across modules.

use std::borrow::Cow;
use std::path::PathBuf;

/// Expand a leading `~` to `$HOME`.
///
/// - `"~"` → `"/home/user"`
/// - `"~/foo"` → `"/home/user/foo"`
/// - Anything else passes through unchanged.
pub fn expand_tilde(path: &str) -> Cow<'_, str> {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            if path == "~" {
                return Cow::Owned(home);
            }
            return Cow::Owned(format!("{}{}", home, &path[1..]));
        }
    }
    Cow::Borrowed(path)
}

/// [`expand_tilde`] into an owned path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(expand_tilde(path).into_owned())
}

/// Trim whitespace and a single trailing `/` from a gateway host.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    host.strip_suffix('/').unwrap_or(host).to_string()
}
