//! One sync cycle: fetch, parse, reconcile, apply, persist.
//!
//! The cycle never aborts half-way because of a single date: calendar
//! failures abandon that date (its previous fingerprint stays, so the next
//! cycle retries it in full) and the other date is still committed. Only a
//! failed fetch, an unrecognizable page or a failed state write end the
//! cycle with an error.

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::calendar::CalendarStore;
use crate::error::OutageResult;
use crate::fetch::PageFetcher;
use crate::notify::Notifier;
use crate::parse::{ParseWarning, ParsedPage, ScheduleParser};
use crate::reconcile::{CalendarOp, DayPlan, Reconciler, Reconciliation};
use crate::state::{StateStore, TrackedState, live_dates};

/// What happened to one changed date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayOutcome {
    pub date: NaiveDate,
    pub first_sighting: bool,
    pub result: DayResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayResult {
    Applied {
        created: usize,
        deleted: usize,
        notified: bool,
    },
    Failed {
        error: String,
    },
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub warnings: Vec<ParseWarning>,
    /// Changed dates, in date order.
    pub days: Vec<DayOutcome>,
    pub unchanged: Vec<NaiveDate>,
}

impl CycleReport {
    pub fn failures(&self) -> impl Iterator<Item = &DayOutcome> {
        self.days
            .iter()
            .filter(|d| matches!(d.result, DayResult::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Total (created, deleted) events across applied dates.
    pub fn counts(&self) -> (usize, usize) {
        self.days
            .iter()
            .fold((0, 0), |(c, d), day| match day.result {
                DayResult::Applied { created, deleted, .. } => (c + created, d + deleted),
                DayResult::Failed { .. } => (c, d),
            })
    }
}

/// The computed, not yet applied, work of a cycle.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub page: ParsedPage,
    pub reconciliation: Reconciliation,
    /// Changed dates whose calendar events could not be listed.
    pub list_failures: Vec<(NaiveDate, String)>,
}

pub struct SyncCycle<'a> {
    fetcher: &'a dyn PageFetcher,
    parser: &'a ScheduleParser,
    reconciler: &'a Reconciler,
    calendar: &'a dyn CalendarStore,
    notifier: Option<&'a dyn Notifier>,
    log_extracted_events: bool,
}

impl<'a> SyncCycle<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        parser: &'a ScheduleParser,
        reconciler: &'a Reconciler,
        calendar: &'a dyn CalendarStore,
    ) -> Self {
        SyncCycle {
            fetcher,
            parser,
            reconciler,
            calendar,
            notifier: None,
            log_extracted_events: false,
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn log_extracted_events(mut self, enabled: bool) -> Self {
        self.log_extracted_events = enabled;
        self
    }

    /// Fetch and parse the page, then plan the changes against `prior`.
    /// Reads from the calendar but never writes to it.
    pub async fn plan(&self, today: NaiveDate, prior: &TrackedState) -> OutageResult<CyclePlan> {
        info!(source = %self.fetcher.source(), %today, "Fetching schedule");
        let html = self.fetcher.fetch().await?;
        let page = self.parser.parse(&html, today)?;

        for warning in &page.warnings {
            warn!("{}", warning);
        }
        if self.log_extracted_events {
            self.log_page(&page);
        }

        let days = self.reconciler.tracked_days(&page.days, today);
        let changed = self.reconciler.changed_days(&days, prior);

        let mut existing = Vec::new();
        let mut list_failures = Vec::new();
        for date in &changed {
            match self.calendar.list_events(*date).await {
                Ok(events) => existing.extend(events),
                Err(e) => {
                    warn!(%date, error = %e, "Could not list calendar events, skipping date");
                    list_failures.push((*date, e.to_string()));
                }
            }
        }

        let listable: Vec<_> = days
            .into_iter()
            .filter(|d| !list_failures.iter().any(|(date, _)| *date == d.date))
            .collect();
        let reconciliation = self.reconciler.reconcile(&listable, prior, &existing);

        for (date, fp) in &reconciliation.unchanged {
            let updated_at = page.day(*date).and_then(|d| d.updated_at);
            debug!(%date, fingerprint = fp.short(), ?updated_at, "Schedule unchanged");
        }

        Ok(CyclePlan {
            page,
            reconciliation,
            list_failures,
        })
    }

    /// Run one full cycle for `today` and commit the result to `state`.
    pub async fn run(
        &self,
        today: NaiveDate,
        state: &mut dyn StateStore,
    ) -> OutageResult<CycleReport> {
        let prior = state.load();
        let plan = self.plan(today, &prior).await?;

        let mut report = CycleReport {
            warnings: plan.page.warnings.clone(),
            days: Vec::new(),
            unchanged: plan.reconciliation.unchanged.keys().copied().collect(),
        };

        for (date, error) in &plan.list_failures {
            report.days.push(DayOutcome {
                date: *date,
                first_sighting: prior.get(*date).is_none(),
                result: DayResult::Failed {
                    error: error.clone(),
                },
            });
        }

        let mut next = prior.clone();
        for day in &plan.reconciliation.plans {
            let result = match self.apply(day).await {
                Ok(()) => {
                    next.insert(day.date, day.fingerprint.clone());
                    info!(
                        date = %day.date,
                        created = day.creates(),
                        deleted = day.deletes(),
                        fingerprint = day.fingerprint.short(),
                        "Schedule applied"
                    );
                    DayResult::Applied {
                        created: day.creates(),
                        deleted: day.deletes(),
                        notified: self.notify(day).await,
                    }
                }
                Err(e) => {
                    warn!(date = %day.date, error = %e, "Could not apply schedule, will retry next cycle");
                    DayResult::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.days.push(DayOutcome {
                date: day.date,
                first_sighting: day.first_sighting(),
                result,
            });
        }
        report.days.sort_by_key(|d| d.date);

        if next != prior {
            state.save(&next)?;
        }
        state.prune(&live_dates(today))?;

        Ok(report)
    }

    /// Apply a day's operations in order, stopping at the first failure.
    async fn apply(&self, day: &DayPlan) -> OutageResult<()> {
        for op in &day.ops {
            debug!("{}", op);
            match op {
                CalendarOp::Delete(event) => self.calendar.delete_event(event).await?,
                CalendarOp::Create(event) => {
                    self.calendar.create_event(event).await?;
                }
            }
        }
        Ok(())
    }

    async fn notify(&self, day: &DayPlan) -> bool {
        let Some(notifier) = self.notifier else {
            return false;
        };
        match notifier.notify(&day.notice(self.reconciler.queue())).await {
            Ok(()) => true,
            Err(e) => {
                error!(date = %day.date, error = %e, "Failed to send change notification");
                false
            }
        }
    }

    fn log_page(&self, page: &ParsedPage) {
        for day in &page.days {
            if day.queue_ranges.is_empty() {
                info!(date = %day.date, "Extracted day without queues");
            }
            for (queue, ranges) in &day.queue_ranges {
                let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
                info!(
                    date = %day.date,
                    %queue,
                    updated_at = ?day.updated_at,
                    ranges = %ranges.join(", "),
                    "Extracted schedule"
                );
            }
        }
    }
}
