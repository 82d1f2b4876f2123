use chrono::{DateTime, Utc};

/// Label key binding a Deployment generation to its Services
pub const VERSION_LABEL: &str = "patch";

/// Pod template annotation that forces a rolling restart
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Fixed-width version stamp: `YYYYMMDDhhmmss` (UTC)
///
/// Lexical order of two stamps matches their chronological order.
pub fn version_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Strip a trailing `-<digits>` version suffix from a name
///
/// # Examples
/// ```ignore
/// assert_eq!(base_name("my-app-20191011134834"), "my-app");
/// assert_eq!(base_name("my-app"), "my-app");
/// assert_eq!(base_name("my-app-v2"), "my-app-v2");
/// ```
pub fn base_name(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((base, suffix))
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

/// `<base>-<timestamp>`
pub fn versioned_name(base: &str, timestamp: &str) -> String {
    format!("{}-{}", base, timestamp)
}
