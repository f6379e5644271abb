//! Provider-neutral schedule types.

mod queue;
mod time_range;

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub use queue::QueueId;
pub use time_range::{MINUTES_PER_DAY, TimeRange, normalize, parse_clock};

/// One day's outage schedule as published on the source page.
///
/// Produced fresh by every parse and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    /// Publish/update timestamp printed in the block, if any. Informational only.
    pub updated_at: Option<NaiveDateTime>,
    pub queue_ranges: BTreeMap<QueueId, Vec<TimeRange>>,
}

impl DaySchedule {
    /// A day that is published but lists no outages for any queue.
    pub fn empty(date: NaiveDate) -> Self {
        DaySchedule {
            date,
            updated_at: None,
            queue_ranges: BTreeMap::new(),
        }
    }

    /// Ranges for `queue`; empty when the queue is not listed for this day.
    pub fn ranges_for(&self, queue: &QueueId) -> &[TimeRange] {
        self.queue_ranges
            .get(queue)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
