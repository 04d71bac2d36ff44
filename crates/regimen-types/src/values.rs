//! Runtime value types shared by the engine and the session codec.
//!
//! - [`FlagData`] -- a set flag with optional expiry and display text.
//! - [`TimeValue`] -- the three-way union stored in `!time` variables.
//!
//! Also hosts the literal parsers and formatters for time values, since
//! script payloads, prompts and templates all agree on one textual form.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Seconds in one minute.
pub const SECS_PER_MINUTE: i64 = 60;
/// Seconds in one hour.
pub const SECS_PER_HOUR: i64 = 3_600;
/// Seconds in one day.
pub const SECS_PER_DAY: i64 = 86_400;

// ---------------------------------------------------------------------------
// FlagData
// ---------------------------------------------------------------------------

/// A set flag.
///
/// An absent `expiry_time` means the flag never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagData {
    /// Lowercase flag name (unique key in the flag map).
    pub name: String,
    /// When the flag was set.
    pub set_time: NaiveDateTime,
    /// When the flag stops counting as set.
    #[serde(default)]
    pub expiry_time: Option<NaiveDateTime>,
    /// Free display text attached when the flag was set.
    #[serde(default)]
    pub text: String,
    /// Groups copied from the flag definition.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl FlagData {
    /// Whether the flag still counts as set at `now`.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.expiry_time.is_none_or(|expiry| now < expiry)
    }
}

// ---------------------------------------------------------------------------
// TimeValue
// ---------------------------------------------------------------------------

/// A value stored in a `!time` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeValue {
    /// A signed duration in seconds.
    Interval(i64),
    /// A wall-clock time of day.
    TimeOfDay(NaiveTime),
    /// An absolute date and time.
    DateTime(NaiveDateTime),
}

impl TimeValue {
    /// Parse a time literal.
    ///
    /// Accepted forms, tried in order: `YYYY-MM-DD HH:MM[:SS]`,
    /// `YYYY-MM-DD` (midnight), `HH:MM[:SS]` (time of day), and any
    /// interval form accepted by [`parse_interval`].
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(dt) = parse_date_time(text) {
            return Some(Self::DateTime(dt));
        }
        if let Some(date) = parse_date(text) {
            return Some(Self::DateTime(date.and_time(NaiveTime::MIN)));
        }
        if let Some(time) = parse_time_of_day(text) {
            return Some(Self::TimeOfDay(time));
        }
        parse_interval(text).map(Self::Interval)
    }

    /// Interpret the value as a number of seconds.
    ///
    /// Times of day count seconds since midnight; date-times count seconds
    /// since the Unix epoch.
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Interval(secs) => *secs,
            Self::TimeOfDay(t) => i64::from(t.num_seconds_from_midnight()),
            Self::DateTime(dt) => dt.and_utc().timestamp(),
        }
    }

    /// Format with a template suffix: `d` (date), `t` (time), `i`
    /// (interval), `dt` (date and time). Unknown suffixes fall back to
    /// [`fmt::Display`](std::fmt::Display).
    pub fn format_with(&self, suffix: &str) -> String {
        match (suffix.trim().to_ascii_lowercase().as_str(), self) {
            ("d", Self::DateTime(dt)) => dt.format("%Y-%m-%d").to_string(),
            ("t", Self::DateTime(dt)) => dt.format("%H:%M").to_string(),
            ("t", Self::TimeOfDay(t)) => t.format("%H:%M").to_string(),
            ("dt", Self::DateTime(dt)) => dt.format("%Y-%m-%d %H:%M").to_string(),
            ("i", value) => format_interval(value.as_seconds()),
            _ => self.to_string(),
        }
    }
}

impl std::fmt::Display for TimeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval(secs) => f.write_str(&format_interval(*secs)),
            Self::TimeOfDay(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

// ---------------------------------------------------------------------------
// Literal parsing
// ---------------------------------------------------------------------------

/// Parse `YYYY-MM-DD HH:MM[:SS]`.
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_err| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
        .ok()
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

/// Parse `HH:MM[:SS]` as a time of day.
pub fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_err| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// Parse an interval into seconds.
///
/// Accepted forms: `D HH:MM[:SS]`, `HH:MM[:SS]` (hours may exceed 23),
/// `Nd` (whole days), and a bare signed integer (seconds). A leading `-`
/// negates any form.
pub fn parse_interval(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(rest) = text.strip_prefix('-') {
        return parse_interval(rest).map(i64::wrapping_neg);
    }
    if let Ok(secs) = text.parse::<i64>() {
        return Some(secs);
    }
    if let Some(days) = text.strip_suffix('d').or_else(|| text.strip_suffix('D')) {
        return days.trim().parse::<i64>().ok()?.checked_mul(SECS_PER_DAY);
    }
    let (days, clock) = match text.split_once(' ') {
        Some((d, rest)) => (d.trim().parse::<i64>().ok()?, rest.trim()),
        None => (0, text),
    };
    let mut parts = clock.split(':');
    let hours = parts.next()?.trim().parse::<i64>().ok()?;
    let minutes = parts.next()?.trim().parse::<i64>().ok()?;
    let seconds = match parts.next() {
        Some(s) => s.trim().parse::<i64>().ok()?,
        None => 0,
    };
    if parts.next().is_some() || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }
    days.checked_mul(SECS_PER_DAY)?
        .checked_add(hours.checked_mul(SECS_PER_HOUR)?)?
        .checked_add(minutes.checked_mul(SECS_PER_MINUTE)?)?
        .checked_add(seconds)
}

/// Format seconds as `[D ]HH:MM:SS`, with a leading `-` when negative.
pub fn format_interval(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let total = secs.unsigned_abs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    }
}
