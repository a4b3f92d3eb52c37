use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::time::TimeSource;

/// Custom epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const CUSTOM_EPOCH: Duration = Duration::from_millis(1_735_689_600_000);

/// Twitter epoch: Thursday, November 4, 2010 1:42:54.657 UTC
pub const TWITTER_EPOCH: Duration = Duration::from_millis(1_288_834_974_657);

/// Standard UNIX epoch: Thursday, January 1, 1970 00:00:00 UTC
pub const UNIX_EPOCH_MILLIS: Duration = Duration::from_millis(0);

/// A wall-clock time source offset from a user-defined epoch.
///
/// Every call reads [`SystemTime::now`], so NTP corrections and manual clock
/// changes are visible to the caller. That is the point: the ID algorithms
/// compare each reading with the last issued timestamp and fail with
/// [`Error::ClockRegression`] instead of silently reusing a time window.
///
/// Readings earlier than the epoch saturate to `0`.
///
/// [`Error::ClockRegression`]: crate::Error::ClockRegression
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch_millis: u64,
}

impl Default for SystemClock {
    /// Constructs a clock aligned to the default [`CUSTOM_EPOCH`].
    fn default() -> Self {
        Self::with_epoch(CUSTOM_EPOCH)
    }
}

impl SystemClock {
    /// Constructs a clock using `epoch` (a [`Duration`] since 1970-01-01 UTC)
    /// as the origin.
    ///
    /// # Example
    ///
    /// ```
    /// use ferroslot::{SystemClock, TimeSource, TWITTER_EPOCH};
    ///
    /// let clock = SystemClock::with_epoch(TWITTER_EPOCH);
    /// assert!(clock.current_millis() > 0);
    /// ```
    pub const fn with_epoch(epoch: Duration) -> Self {
        Self {
            epoch_millis: epoch.as_millis() as u64,
        }
    }

    /// The configured epoch in milliseconds since the Unix epoch.
    pub const fn epoch_millis(&self) -> u64 {
        self.epoch_millis
    }
}

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        let unix_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        unix_millis.saturating_sub(self.epoch_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_are_relative_to_epoch() {
        let unix = SystemClock::with_epoch(UNIX_EPOCH_MILLIS);
        let custom = SystemClock::default();

        let delta = unix.current_millis() - custom.current_millis();
        // Both reads happen within a few milliseconds of each other.
        assert!(delta.abs_diff(CUSTOM_EPOCH.as_millis() as u64) < 1_000);
    }

    #[test]
    fn future_epoch_saturates_to_zero() {
        let clock = SystemClock::with_epoch(Duration::from_millis(u64::MAX));
        assert_eq!(clock.current_millis(), 0);
    }
}
