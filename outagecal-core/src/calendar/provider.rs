//! Calendar store backed by an external provider executable.
//!
//! Any executable that speaks the JSON protocol in [`super::protocol`] can
//! be a provider. Providers manage their own credentials; outagecal just
//! passes the provider parameters from the `[calendar]` config table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::calendar::protocol::{
    Command, CreateEvent, DeleteEvent, ListEvents, ProviderCommand, RemoteEvent, RemoteNewEvent,
    Request, Response,
};
use crate::calendar::{CalendarEvent, CalendarStore, NewEvent, localize};
use crate::error::{OutageError, OutageResult};

pub struct ProviderCalendarStore {
    program: String,
    calendar: String,
    tz: Tz,
    params: serde_json::Map<String, serde_json::Value>,
    timeout: Duration,
}

impl ProviderCalendarStore {
    pub fn new(
        program: impl Into<String>,
        calendar: impl Into<String>,
        tz: Tz,
        params: serde_json::Map<String, serde_json::Value>,
        timeout: Duration,
    ) -> Self {
        ProviderCalendarStore {
            program: program.into(),
            calendar: calendar.into(),
            tz,
            params,
            timeout,
        }
    }

    /// Provider parameters plus the calendar name and time zone, sent with
    /// every command.
    fn remote_config(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut config = self.params.clone();
        config.insert("calendar".into(), self.calendar.clone().into());
        config.insert("timezone".into(), self.tz.name().into());
        config
    }

    /// Absolute paths are used as-is; bare names are looked up on `PATH`,
    /// first verbatim, then as `outagecal-provider-<name>`.
    fn binary_path(&self) -> OutageResult<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return Ok(program.to_path_buf());
        }

        let prefixed = format!("outagecal-provider-{}", self.program);
        which::which(&self.program)
            .or_else(|_| which::which(&prefixed))
            .map_err(|_| OutageError::ProviderNotInstalled(self.program.clone()))
    }

    fn to_remote(&self, local: NaiveDateTime) -> OutageResult<DateTime<FixedOffset>> {
        localize(self.tz, local)
            .map(|dt| dt.fixed_offset())
            .ok_or_else(|| OutageError::Provider(format!("{} does not exist in {}", local, self.tz)))
    }

    fn local_event(&self, event: RemoteEvent) -> CalendarEvent {
        let start = event.start.with_timezone(&self.tz).naive_local();
        let end = event.end.with_timezone(&self.tz).naive_local();
        CalendarEvent {
            id: event.id,
            date: start.date(),
            start,
            end,
            title: event.summary,
        }
    }

    /// Call a typed provider command, bounded by the configured timeout.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> OutageResult<C::Response> {
        timeout(self.timeout, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| OutageError::ProviderTimeout(self.timeout.as_secs()))?
    }

    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> OutageResult<R> {
        let params =
            serde_json::to_value(params).map_err(|e| OutageError::Serialization(e.to_string()))?;
        let request = Request { command, params };
        let request_json =
            serde_json::to_string(&request).map_err(|e| OutageError::Serialization(e.to_string()))?;

        let binary_path = self.binary_path()?;
        debug!(provider = %binary_path.display(), command = ?command, "Calling provider");

        let mut child = TokioCommand::new(&binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OutageError::Provider(format!("Failed to spawn {}: {}", binary_path.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OutageError::Provider("Provider stdin unavailable".into()))?;
        stdin.write_all(format!("{request_json}\n").as_bytes()).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(OutageError::Provider(format!(
                "Provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(OutageError::Provider("Provider returned no response".into()));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| OutageError::Provider(format!("Failed to parse response: {}", e)))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error } => Err(OutageError::Provider(error)),
        }
    }
}

#[async_trait]
impl CalendarStore for ProviderCalendarStore {
    async fn list_events(&self, date: NaiveDate) -> OutageResult<Vec<CalendarEvent>> {
        let day_start = self.to_remote(date.and_time(chrono::NaiveTime::MIN))?;
        let day_end = self.to_remote((date + ChronoDuration::days(1)).and_time(chrono::NaiveTime::MIN))?;

        let remote = self
            .call(ListEvents {
                remote_config: self.remote_config(),
                from: day_start.to_rfc3339(),
                to: day_end.to_rfc3339(),
            })
            .await?;

        Ok(remote
            .into_iter()
            .map(|event| self.local_event(event))
            .filter(|event| event.date == date)
            .collect())
    }

    async fn create_event(&self, event: &NewEvent) -> OutageResult<CalendarEvent> {
        let created = self
            .call(CreateEvent {
                remote_config: self.remote_config(),
                event: RemoteNewEvent {
                    summary: event.title.clone(),
                    description: event.description.clone(),
                    start: self.to_remote(event.start)?,
                    end: self.to_remote(event.end)?,
                },
            })
            .await?;
        Ok(self.local_event(created))
    }

    async fn delete_event(&self, event: &CalendarEvent) -> OutageResult<()> {
        self.call(DeleteEvent {
            remote_config: self.remote_config(),
            event_id: event.id.clone(),
        })
        .await
    }
}
