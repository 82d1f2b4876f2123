//! Rollout configuration
//!
//! Read from the environment, then overridden by command line flags:
//! - `PATCHROLL_READINESS_TIMEOUT`: deadline for each readiness wait, e.g. `90s`, `5m`
//! - `PATCHROLL_PARALLEL`: `true`/`1` to duplicate and await all Deployments concurrently

use std::time::Duration;
use thiserror::Error;

pub const READINESS_TIMEOUT_ENV: &str = "PATCHROLL_READINESS_TIMEOUT";
pub const PARALLEL_ENV: &str = "PATCHROLL_PARALLEL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration '{0}': expected e.g. '30s', '5m' or '2h'")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutConfig {
    /// No deadline when None: the readiness wait blocks until observed
    pub readiness_timeout: Option<Duration>,
    pub parallel: bool,
}

impl RolloutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let readiness_timeout = match lookup(READINESS_TIMEOUT_ENV) {
            Some(raw) if !raw.trim().is_empty() => Some(
                parse_duration(&raw).ok_or_else(|| ConfigError::InvalidDuration(raw.clone()))?,
            ),
            _ => None,
        };
        let parallel = lookup(PARALLEL_ENV)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(RolloutConfig {
            readiness_timeout,
            parallel,
        })
    }

    /// Apply command line flags on top of the environment
    ///
    /// `None` keeps the environment's value.
    pub fn with_overrides(
        mut self,
        readiness_timeout: Option<Duration>,
        parallel: Option<bool>,
    ) -> Self {
        if readiness_timeout.is_some() {
            self.readiness_timeout = readiness_timeout;
        }
        if let Some(parallel) = parallel {
            self.parallel = parallel;
        }
        self
    }
}

/// Parse a duration string like "5m", "30s", "1h"
///
/// - seconds up to 24h (86400s)
/// - minutes up to 24h (1440m)
/// - hours up to 1 week (168h)
///
/// Zero, unknown units and out-of-range values return None.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();
    let unit = duration_str.chars().last()?;
    let number: u64 = duration_str[..duration_str.len() - unit.len_utf8()]
        .parse()
        .ok()?;

    if number == 0 {
        return None;
    }

    match unit {
        's' if number <= 86400 => Some(Duration::from_secs(number)),
        'm' if number <= 1440 => number.checked_mul(60).map(Duration::from_secs),
        'h' if number <= 168 => number.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// clap value parser for duration flags
pub fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration(value.to_string()).to_string())
}
