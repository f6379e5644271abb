//! Change notifications for today's and tomorrow's schedule.

mod mail;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use crate::error::OutageResult;
use crate::schedule::{QueueId, TimeRange};

pub use mail::{MailNotifier, SmtpOptions};

/// What changed for one date, as sent to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub date: NaiveDate,
    pub queue: QueueId,
    pub updated_at: Option<NaiveDateTime>,
    pub ranges: Vec<TimeRange>,
}

impl ChangeNotice {
    pub fn subject(&self) -> String {
        format!(
            "Power outage schedule updated: {} (Queue {})",
            self.date, self.queue
        )
    }

    pub fn body(&self) -> String {
        let updated_at = self
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let mut lines = vec![
            "Detected schedule update.".to_string(),
            format!("Date: {}", self.date),
            format!("Queue: {}", self.queue),
            format!("Source updated at: {}", updated_at),
            String::new(),
            "Time ranges:".to_string(),
        ];

        if self.ranges.is_empty() {
            lines.push("- (no ranges)".to_string());
        }
        for range in &self.ranges {
            lines.push(format!(
                "- {} -> {}",
                range.start_on(self.date).format("%Y-%m-%d %H:%M"),
                range.end_on(self.date).format("%Y-%m-%d %H:%M")
            ));
        }

        lines.join("\n")
    }
}

/// Outbound channel for [`ChangeNotice`]s.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &ChangeNotice) -> OutageResult<()>;
}

/// Writes notices to the log instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &ChangeNotice) -> OutageResult<()> {
        let ranges: Vec<String> = notice.ranges.iter().map(ToString::to_string).collect();
        info!(
            date = %notice.date,
            queue = %notice.queue,
            ranges = %ranges.join(", "),
            "{}",
            notice.subject()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(ranges: &[&str]) -> ChangeNotice {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        ChangeNotice {
            date,
            queue: QueueId::new("1.1").unwrap(),
            updated_at: date.and_hms_opt(7, 45, 0),
            ranges: ranges.iter().map(|r| r.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn test_subject() {
        assert_eq!(
            notice(&[]).subject(),
            "Power outage schedule updated: 2026-10-18 (Queue 1.1)"
        );
    }

    #[test]
    fn test_body_lists_ranges() {
        let body = notice(&["09:00-13:00", "20:00-24:00"]).body();
        assert!(body.contains("Source updated at: 2026-10-18 07:45"));
        assert!(body.contains("- 2026-10-18 09:00 -> 2026-10-18 13:00"));
        assert!(body.contains("- 2026-10-18 20:00 -> 2026-10-19 00:00"));
        assert!(!body.contains("(no ranges)"));
    }

    #[test]
    fn test_body_without_ranges() {
        let mut notice = notice(&[]);
        notice.updated_at = None;
        let body = notice.body();
        assert!(body.ends_with("Time ranges:\n- (no ranges)"));
        assert!(body.contains("Source updated at: unknown"));
    }
}
