//! Typed environment variable lookups.

use std::str::FromStr;

/// Read environment variable and parse it, or return default
pub(crate) fn env_var_or_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            matches!(v_lower.as_str(), "true" | "1" | "yes" | "on")
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default; empty values count as unset
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
