//! Replay protection for signed request timestamps

use crate::core::service::ServiceError;
use chrono::{DateTime, Duration, FixedOffset, Utc};

/// Maximum age a signed timestamp may have when a request arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow {
    max_age: Duration,
}

impl FreshnessWindow {
    /// Window applied to package pushes
    pub const PUSH_SECS: u64 = 60 * 60;

    /// Window applied to package removals
    pub const REMOVE_SECS: u64 = 60;

    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self {
            max_age: Duration::seconds(secs),
        }
    }

    /// Parse an RFC 3339 timestamp header and check it against `now`
    ///
    /// Timestamps older than the window, or further than the window ahead
    /// of `now`, are rejected as stale.
    pub fn check(&self, sent: &str, now: DateTime<Utc>) -> Result<DateTime<FixedOffset>, ServiceError> {
        let parsed = DateTime::parse_from_rfc3339(sent).map_err(|e| {
            ServiceError::MalformedRequest(format!("invalid time header '{}': {}", sent, e))
        })?;

        let age = now.signed_duration_since(parsed.with_timezone(&Utc));
        if age > self.max_age {
            return Err(ServiceError::StaleRequest(format!(
                "message sent at {} is older than {} seconds",
                sent,
                self.max_age.num_seconds()
            )));
        }
        if -age > self.max_age {
            return Err(ServiceError::StaleRequest(format!(
                "message sent at {} is too far in the future",
                sent
            )));
        }
        Ok(parsed)
    }
}
