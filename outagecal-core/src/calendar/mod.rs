//! Target calendar: event types and the store interface.

mod caldav;
mod ics;
pub mod protocol;
mod provider;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::OutageResult;
use crate::schedule::{QueueId, TimeRange};

pub use caldav::CalDavCalendarStore;
pub use provider::ProviderCalendarStore;

/// An event as it exists on the target calendar.
///
/// Times are local to the configured time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Store-assigned identifier, used for deletion.
    pub id: String,
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: String,
}

impl CalendarEvent {
    /// Whether this event was created by outagecal (title carries the prefix).
    pub fn is_owned_by(&self, event_prefix: &str) -> bool {
        self.title.starts_with(event_prefix)
    }
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.title,
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// An event to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: String,
    pub description: String,
}

impl NewEvent {
    pub fn for_outage(date: NaiveDate, range: TimeRange, queue: &QueueId, event_prefix: &str) -> Self {
        NewEvent {
            date,
            start: range.start_on(date),
            end: range.end_on(date),
            title: event_title(event_prefix, queue),
            description: format!("Scheduled outage for queue {}", queue),
        }
    }
}

pub fn event_title(event_prefix: &str, queue: &QueueId) -> String {
    format!("{} (Queue {})", event_prefix, queue)
}

/// Resolve a local wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times skipped by a DST jump move forward by an hour.
pub(crate) fn localize(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
}

/// A named calendar that events can be listed in, created in and deleted from.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Events starting on `date` (local time).
    async fn list_events(&self, date: NaiveDate) -> OutageResult<Vec<CalendarEvent>>;

    async fn create_event(&self, event: &NewEvent) -> OutageResult<CalendarEvent>;

    async fn delete_event(&self, event: &CalendarEvent) -> OutageResult<()>;
}
