//! Source of the instant a rollout is stamped with
//!
//! Each orchestration run calls [`Clock::now`] once and derives every version
//! label and Deployment name of that run from the result.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock (UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct MockClock(DateTime<Utc>);

#[cfg(test)]
impl MockClock {
    /// e.g. `MockClock::at("2019-10-11T13:48:34Z")`
    #[allow(clippy::expect_used)]
    pub fn at(rfc3339: &str) -> Self {
        let instant = DateTime::parse_from_rfc3339(rfc3339)
            .expect("MockClock::at needs an RFC 3339 timestamp")
            .with_timezone(&Utc);
        MockClock(instant)
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
