//! Change detection and calendar operations per date.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::calendar::{CalendarEvent, NewEvent};
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::notify::ChangeNotice;
use crate::schedule::{DaySchedule, QueueId, TimeRange};
use crate::state::TrackedState;

/// One write against the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarOp {
    Create(NewEvent),
    Delete(CalendarEvent),
}

impl CalendarOp {
    pub fn date(&self) -> NaiveDate {
        match self {
            CalendarOp::Create(event) => event.date,
            CalendarOp::Delete(event) => event.date,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, CalendarOp::Create(_))
    }
}

impl fmt::Display for CalendarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarOp::Create(event) => write!(
                f,
                "+ {} {}-{}",
                event.title,
                event.start.format("%Y-%m-%d %H:%M"),
                event.end.format("%H:%M")
            ),
            CalendarOp::Delete(event) => write!(f, "- {}", event),
        }
    }
}

/// Everything needed to bring one changed date in line with the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub fingerprint: Fingerprint,
    pub previous: Option<Fingerprint>,
    pub ranges: Vec<TimeRange>,
    pub updated_at: Option<NaiveDateTime>,
    /// All deletes first, then all creates.
    pub ops: Vec<CalendarOp>,
}

impl DayPlan {
    /// The date had no tracked fingerprint before this cycle.
    pub fn first_sighting(&self) -> bool {
        self.previous.is_none()
    }

    pub fn creates(&self) -> usize {
        self.ops.iter().filter(|op| op.is_create()).count()
    }

    pub fn deletes(&self) -> usize {
        self.ops.len() - self.creates()
    }

    pub fn notice(&self, queue: &QueueId) -> ChangeNotice {
        ChangeNotice {
            date: self.date,
            queue: queue.clone(),
            updated_at: self.updated_at,
            ranges: self.ranges.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub plans: Vec<DayPlan>,
    /// Dates whose schedule matches what was last applied.
    pub unchanged: BTreeMap<NaiveDate, Fingerprint>,
}

impl Reconciliation {
    pub fn operations(&self) -> impl Iterator<Item = &CalendarOp> {
        self.plans.iter().flat_map(|plan| plan.ops.iter())
    }

    /// The tracked state once every plan has been applied.
    pub fn fingerprints(&self) -> TrackedState {
        self.unchanged
            .iter()
            .map(|(date, fp)| (*date, fp.clone()))
            .chain(self.plans.iter().map(|plan| (plan.date, plan.fingerprint.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Decides which dates changed for one queue and what to do about it.
#[derive(Debug, Clone)]
pub struct Reconciler {
    queue: QueueId,
    event_prefix: String,
    clear_missing_today: bool,
}

impl Reconciler {
    pub fn new(queue: QueueId, event_prefix: impl Into<String>) -> Self {
        Reconciler {
            queue,
            event_prefix: event_prefix.into(),
            clear_missing_today: false,
        }
    }

    /// Treat a page without a schedule for today as an empty schedule for
    /// today, removing today's outage events.
    pub fn with_clear_missing_today(mut self, clear: bool) -> Self {
        self.clear_missing_today = clear;
        self
    }

    pub fn queue(&self) -> &QueueId {
        &self.queue
    }

    pub fn event_prefix(&self) -> &str {
        &self.event_prefix
    }

    /// The schedules to reconcile for `today`: the parsed days, plus an
    /// empty today when clearing is enabled and the page has none.
    pub fn tracked_days(&self, parsed: &[DaySchedule], today: NaiveDate) -> Vec<DaySchedule> {
        let mut days = parsed.to_vec();
        if self.clear_missing_today && !days.iter().any(|d| d.date == today) {
            days.push(DaySchedule::empty(today));
        }
        days.sort_by_key(|d| d.date);
        days
    }

    fn day_fingerprint(&self, day: &DaySchedule) -> Fingerprint {
        fingerprint(&self.queue, day.ranges_for(&self.queue))
    }

    /// Dates whose fingerprint differs from the tracked one, including dates
    /// seen for the first time.
    pub fn changed_days(&self, parsed: &[DaySchedule], prior: &TrackedState) -> Vec<NaiveDate> {
        parsed
            .iter()
            .filter(|day| prior.get(day.date) != Some(&self.day_fingerprint(day)))
            .map(|day| day.date)
            .collect()
    }

    /// Plan the calendar operations for every changed date.
    ///
    /// `existing` holds the calendar's events for (at least) the changed
    /// dates. Only events whose title starts with the event prefix are ever
    /// deleted. Dates tracked in `prior` but absent from `parsed` produce
    /// nothing.
    pub fn reconcile(
        &self,
        parsed: &[DaySchedule],
        prior: &TrackedState,
        existing: &[CalendarEvent],
    ) -> Reconciliation {
        let mut reconciliation = Reconciliation::default();

        for day in parsed {
            let ranges = day.ranges_for(&self.queue).to_vec();
            let fp = fingerprint(&self.queue, &ranges);
            let previous = prior.get(day.date).cloned();

            if previous.as_ref() == Some(&fp) {
                reconciliation.unchanged.insert(day.date, fp);
                continue;
            }

            let deletes = existing
                .iter()
                .filter(|event| event.date == day.date && event.is_owned_by(&self.event_prefix))
                .cloned()
                .map(CalendarOp::Delete);
            let creates = ranges.iter().map(|range| {
                CalendarOp::Create(NewEvent::for_outage(
                    day.date,
                    *range,
                    &self.queue,
                    &self.event_prefix,
                ))
            });

            reconciliation.plans.push(DayPlan {
                date: day.date,
                fingerprint: fp,
                previous,
                ranges: ranges.clone(),
                updated_at: day.updated_at,
                ops: deletes.chain(creates).collect(),
            });
        }

        reconciliation
    }
}
