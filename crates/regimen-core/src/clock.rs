//! Simulated wall clock.
//!
//! The clock is the single source of truth for "now" inside the engine.
//! It advances only when the scheduler ticks or the user fast-forwards, so
//! a session can be replayed deterministically from a saved record.
//!
//! # Design Principles
//!
//! - All advances use checked arithmetic (no silent overflow).
//! - Time only moves forward. Negative offsets are rejected.
//! - Date, time of day and weekday are derived from the stored instant,
//!   never stored independently.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use regimen_types::{SECS_PER_DAY, SECS_PER_HOUR, SECS_PER_MINUTE};
use serde::{Deserialize, Serialize};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// A negative offset was requested.
    #[error("invalid clock offset: {seconds}s (time only moves forward)")]
    InvalidOffset {
        /// The rejected offset in seconds.
        seconds: i64,
    },

    /// The offset would move the clock past the representable range.
    #[error("clock overflow: cannot advance by {seconds}s")]
    Overflow {
        /// The requested offset in seconds.
        seconds: i64,
    },
}

/// Simulated clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulated instant.
    now: NaiveDateTime,
}

impl SimClock {
    /// Create a clock at the given instant.
    pub const fn new(now: NaiveDateTime) -> Self {
        Self { now }
    }

    /// The current instant.
    pub const fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// The current date.
    pub fn date(&self) -> NaiveDate {
        self.now.date()
    }

    /// The current time of day.
    pub fn time(&self) -> NaiveTime {
        self.now.time()
    }

    /// The current weekday.
    pub fn weekday(&self) -> Weekday {
        self.now.weekday()
    }

    /// Advance the clock by `seconds`. Returns the new instant.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidOffset`] for negative offsets and
    /// [`ClockError::Overflow`] if the result is out of range.
    pub fn advance(&mut self, seconds: i64) -> Result<NaiveDateTime, ClockError> {
        if seconds < 0 {
            return Err(ClockError::InvalidOffset { seconds });
        }
        let delta = TimeDelta::try_seconds(seconds).ok_or(ClockError::Overflow { seconds })?;
        self.now = self
            .now
            .checked_add_signed(delta)
            .ok_or(ClockError::Overflow { seconds })?;
        Ok(self.now)
    }

    /// Advance by a composite offset. Returns the total offset in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidOffset`] if the total is negative, and
    /// [`ClockError::Overflow`] if it cannot be represented.
    pub fn fast_forward(
        &mut self,
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
    ) -> Result<i64, ClockError> {
        let total = offset_seconds(days, hours, minutes, seconds)
            .ok_or(ClockError::Overflow { seconds: i64::MAX })?;
        self.advance(total)?;
        Ok(total)
    }
}

/// Combine a composite offset into seconds, or `None` on overflow.
pub fn offset_seconds(days: i64, hours: i64, minutes: i64, seconds: i64) -> Option<i64> {
    days.checked_mul(SECS_PER_DAY)?
        .checked_add(hours.checked_mul(SECS_PER_HOUR)?)?
        .checked_add(minutes.checked_mul(SECS_PER_MINUTE)?)?
        .checked_add(seconds)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap()
    }

    #[test]
    fn advance_moves_forward() {
        let mut clock = SimClock::new(start());
        clock.advance(3_600).unwrap();
        assert_eq!(clock.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(clock.time(), NaiveTime::MIN);
        assert_eq!(clock.weekday(), Weekday::Tue);
    }

    #[test]
    fn advance_by_zero_is_allowed() {
        let mut clock = SimClock::new(start());
        assert_eq!(clock.advance(0).unwrap(), start());
    }

    #[test]
    fn negative_offset_rejected() {
        let mut clock = SimClock::new(start());
        let result = clock.advance(-1);
        assert!(matches!(result, Err(ClockError::InvalidOffset { seconds: -1 })));
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn fast_forward_combines_units() {
        let mut clock = SimClock::new(start());
        let total = clock.fast_forward(1, 2, 3, 4).unwrap();
        assert_eq!(total, 86_400 + 7_200 + 180 + 4);
        assert_eq!(
            clock.now(),
            NaiveDate::from_ymd_opt(2024, 3, 6)
                .unwrap()
                .and_hms_opt(1, 3, 4)
                .unwrap()
        );
    }

    #[test]
    fn fast_forward_rejects_net_negative() {
        let mut clock = SimClock::new(start());
        assert!(clock.fast_forward(0, 1, -90, 0).is_err());
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn overflow_is_reported() {
        let mut clock = SimClock::new(start());
        assert!(matches!(
            clock.advance(i64::MAX),
            Err(ClockError::Overflow { .. })
        ));
    }
}
