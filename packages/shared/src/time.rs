//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Current Unix timestamp (milliseconds)
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock from a Unix timestamp in milliseconds.
    ///
    /// Out-of-range values fall back to the Unix epoch.
    pub fn new(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: millis_to_datetime(fixed_time_millis).unwrap_or_default(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.fixed_time
    }
}

/// Convert a Unix timestamp (milliseconds) to a UTC instant.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn millis_to_datetime(timestamp_millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp_millis).single()
}

/// Convert a Unix timestamp (milliseconds) to RFC 3339 with millisecond precision.
pub fn millis_to_rfc3339(timestamp_millis: i64) -> Option<String> {
    millis_to_datetime(timestamp_millis).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
