//! Colored terminal rendering for outagecal-core types.

use outagecal_core::parse::ParseWarning;
use outagecal_core::reconcile::{CalendarOp, DayPlan};
use outagecal_core::schedule::DaySchedule;
use outagecal_core::sync::{DayOutcome, DayResult};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for CalendarOp {
    fn render(&self) -> String {
        let text = self.to_string();
        match self {
            CalendarOp::Create(_) => text.green().to_string(),
            CalendarOp::Delete(_) => text.red().to_string(),
        }
    }
}

impl Render for ParseWarning {
    fn render(&self) -> String {
        format!("{} {}", "!".yellow(), self.to_string().yellow())
    }
}

impl Render for DaySchedule {
    fn render(&self) -> String {
        let updated = self.updated_at.map(|t| t.format("%H:%M %d.%m").to_string());
        let mut lines = vec![date_header(self.date, updated)];

        if self.queue_ranges.is_empty() {
            lines.push("   No queues listed".dimmed().to_string());
        }
        for (queue, ranges) in &self.queue_ranges {
            let ranges = if ranges.is_empty() {
                "power on".dimmed().to_string()
            } else {
                ranges
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            lines.push(format!("   {:<6} {}", queue.to_string().bold(), ranges));
        }

        lines.join("\n")
    }
}

impl Render for DayPlan {
    fn render(&self) -> String {
        let mut lines = vec![date_header(self.date, None)];

        if self.first_sighting() {
            lines.push("   First sync for this date".dimmed().to_string());
        }
        if self.ops.is_empty() {
            lines.push("   No calendar changes".dimmed().to_string());
        }
        for op in &self.ops {
            lines.push(format!("   {}", op.render()));
        }

        lines.join("\n")
    }
}

impl Render for DayOutcome {
    fn render(&self) -> String {
        let status = match &self.result {
            DayResult::Applied {
                created,
                deleted,
                notified,
            } => {
                let mut text = format!(
                    "{} created, {} deleted",
                    created.green(),
                    deleted.red()
                );
                if *notified {
                    text.push_str(&", notified".dimmed().to_string());
                }
                text
            }
            DayResult::Failed { error } => {
                format!("{} {}", "failed:".red(), error.red())
            }
        };
        format!("{}  {}", date_header(self.date, None), status)
    }
}

fn date_header(date: chrono::NaiveDate, updated: Option<String>) -> String {
    match updated {
        Some(updated) => format!("📅 {} {}", date, format!("(updated {})", updated).dimmed()),
        None => format!("📅 {}", date),
    }
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
