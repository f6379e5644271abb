//! Outage intervals within a single day.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A half-open outage interval `[start, end)` on one day.
///
/// Stored as minutes since midnight. `end` may be `24:00`, which is the
/// only way to express an outage lasting until the end of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TimeRange {
    start: u16,
    end: u16,
}

impl TimeRange {
    /// Build a range from minutes since midnight. Requires `start < end <= 24:00`.
    pub fn new(start: u16, end: u16) -> Option<Self> {
        if start < end && end <= MINUTES_PER_DAY {
            Some(TimeRange { start, end })
        } else {
            None
        }
    }

    /// Build a range from two clock strings such as `"09:00"` and `"13:30"`.
    pub fn from_clock(start: &str, end: &str) -> Option<Self> {
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        if start == MINUTES_PER_DAY {
            return None;
        }
        Self::new(start, end)
    }

    pub fn start_minutes(&self) -> u16 {
        self.start
    }

    pub fn end_minutes(&self) -> u16 {
        self.end
    }

    pub fn start_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.start))
    }

    /// End as a date-time; `24:00` becomes midnight of the following day.
    pub fn end_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.end))
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Parse `H:MM` / `HH:MM`. Accepts `24:00` (but no other 24:xx).
pub fn parse_clock(value: &str) -> Option<u16> {
    let (hours, minutes) = value.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;

    match (hours, minutes) {
        (24, 0) => Some(MINUTES_PER_DAY),
        (0..=23, 0..=59) => Some(hours * 60 + minutes),
        _ => None,
    }
}

fn format_clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Sort ranges by start and merge the ones that overlap.
///
/// Touching ranges (`09:00-13:00`, `13:00-17:00`) are kept apart since the
/// source lists them as separate outages.
pub fn normalize(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.sort();
    ranges.dedup();

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.overlaps(&range) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_clock(self.start), format_clock(self.end))
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid time range '{}'. Expected HH:MM-HH:MM", s))?;
        TimeRange::from_clock(start, end)
            .ok_or_else(|| format!("Invalid time range '{}'. Expected HH:MM-HH:MM", s))
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.to_string()
    }
}

impl TryFrom<String> for TimeRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
