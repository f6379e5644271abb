use anyhow::{Result, bail};
use outagecal_core::config::Settings;
use outagecal_core::parse::ScheduleParser;
use outagecal_core::state::StateStore;
use outagecal_core::sync::{CyclePlan, CycleReport, SyncCycle};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize};
use crate::setup;
use crate::utils::tui;

pub async fn run(settings: &Settings, dry_run: bool, quiet: bool) -> Result<()> {
    let tz = settings.tz()?;
    let today = setup::today(tz);

    let fetcher = setup::fetcher(settings, None)?;
    let parser = ScheduleParser::new(&settings.fetch.parser_options())?;
    let reconciler = setup::reconciler(settings)?;
    let calendar = setup::calendar(settings, tz)?;
    let notifier = setup::notifier(settings)?;
    let mut state = setup::state_store(settings)?;

    let mut cycle = SyncCycle::new(fetcher.as_ref(), &parser, &reconciler, calendar.as_ref())
        .log_extracted_events(settings.log_extracted_events);
    if let Some(notifier) = notifier.as_deref() {
        cycle = cycle.with_notifier(notifier);
    }

    let label = format!("Syncing queue {} into '{}'", reconciler.queue(), settings.calendar.name);

    if dry_run {
        let prior = state.load();
        let spinner = tui::create_spinner(label, quiet);
        let plan = cycle.plan(today, &prior).await;
        spinner.finish_and_clear();
        print_plan(&plan?);
        return Ok(());
    }

    let spinner = tui::create_spinner(label, quiet);
    let report = cycle.run(today, &mut state).await;
    spinner.finish_and_clear();
    let report = report?;

    print_report(&report);

    if report.has_failures() {
        let failed = report.failures().count();
        bail!(
            "{} {} could not be synced; they will be retried on the next run",
            failed,
            pluralize("date", failed)
        );
    }

    Ok(())
}

fn print_plan(plan: &CyclePlan) {
    for warning in &plan.page.warnings {
        println!("{}", warning.render());
    }

    for (date, error) in &plan.list_failures {
        println!("📅 {}  {} {}", date, "cannot list events:".red(), error.red());
    }

    if plan.reconciliation.is_empty() && plan.list_failures.is_empty() {
        println!("{}", "Calendar is up to date".dimmed());
        return;
    }

    for day in &plan.reconciliation.plans {
        println!("{}", day.render());
    }

    let creates: usize = plan.reconciliation.plans.iter().map(|p| p.creates()).sum();
    let deletes: usize = plan.reconciliation.plans.iter().map(|p| p.deletes()).sum();
    println!("\n{} ({})", dry_run_summary(creates, deletes), "dry run, nothing changed".dimmed());
}

fn dry_run_summary(creates: usize, deletes: usize) -> String {
    format!(
        "Would create {} {} and delete {} {}",
        creates,
        pluralize("event", creates),
        deletes,
        pluralize("event", deletes)
    )
}

fn print_report(report: &CycleReport) {
    for warning in &report.warnings {
        println!("{}", warning.render());
    }

    for date in &report.unchanged {
        println!("📅 {}  {}", date, "unchanged".dimmed());
    }
    for day in &report.days {
        println!("{}", day.render());
    }

    let (created, deleted) = report.counts();
    if created > 0 || deleted > 0 {
        println!("\nCalendar: {} created, {} deleted", created, deleted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_summary_counts_each_side() {
        assert_eq!(dry_run_summary(2, 1), "Would create 2 events and delete 1 event");
        assert_eq!(dry_run_summary(1, 0), "Would create 1 event and delete 0 events");
    }
}
