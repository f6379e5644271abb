//! Builds the collaborators for a cycle from settings.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use outagecal_core::calendar::{CalDavCalendarStore, CalendarStore, ProviderCalendarStore};
use outagecal_core::config::{CalendarBackend, FetchMethod, NotifyMethod, Settings};
use outagecal_core::fetch::{ChromiumFetcher, FileFetcher, HttpFetcher, PageFetcher};
use outagecal_core::notify::{LogNotifier, MailNotifier, Notifier};
use outagecal_core::reconcile::Reconciler;
use outagecal_core::state::FileStateStore;

/// Today's date where the schedule is published.
pub fn today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// The configured fetcher, or a file reader when `file` is given.
pub fn fetcher(settings: &Settings, file: Option<PathBuf>) -> Result<Box<dyn PageFetcher>> {
    if let Some(path) = file {
        return Ok(Box::new(FileFetcher::new(path)));
    }

    let timeout = settings.fetch.timeout()?;
    Ok(match settings.fetch.method {
        FetchMethod::Http => Box::new(
            HttpFetcher::new(&settings.source_url, timeout)?
                .with_block_selector(&settings.fetch.block_selector)?,
        ),
        FetchMethod::Chromium => Box::new(ChromiumFetcher::new(
            &settings.fetch.chromium,
            &settings.source_url,
            timeout,
        )),
        FetchMethod::File => {
            let path = settings
                .fetch
                .file_path()
                .context("fetch.file is required when fetch.method = \"file\"")?;
            Box::new(FileFetcher::new(path))
        }
    })
}

pub fn reconciler(settings: &Settings) -> Result<Reconciler> {
    Ok(Reconciler::new(settings.queue_id()?, &settings.event_prefix)
        .with_clear_missing_today(settings.clear_missing_today))
}

pub fn calendar(settings: &Settings, tz: Tz) -> Result<Box<dyn CalendarStore>> {
    let calendar = &settings.calendar;
    Ok(match calendar.backend {
        CalendarBackend::CalDav => {
            let (username, password) = calendar.credentials()?;
            let store = CalDavCalendarStore::new(
                &calendar.url,
                username,
                password,
                &calendar.name,
                tz,
                calendar.timeout()?,
            )?;
            let store = match &calendar.calendar_url {
                Some(url) => store.with_collection_url(url)?,
                None => store,
            };
            Box::new(store)
        }
        CalendarBackend::Provider => Box::new(ProviderCalendarStore::new(
            calendar.provider()?,
            &calendar.name,
            tz,
            calendar.params.clone(),
            calendar.timeout()?,
        )),
    })
}

pub fn notifier(settings: &Settings) -> Result<Option<Box<dyn Notifier>>> {
    let notify = &settings.notify;
    Ok(match notify.method {
        NotifyMethod::None => None,
        NotifyMethod::Log => Some(Box::new(LogNotifier)),
        NotifyMethod::Smtp => Some(Box::new(MailNotifier::smtp(
            &notify.smtp_options(),
            notify.to.as_deref().unwrap_or_default(),
            notify.from.as_deref(),
        )?)),
        NotifyMethod::Sendmail => Some(Box::new(MailNotifier::sendmail(
            &notify.sendmail,
            notify.to.as_deref().unwrap_or_default(),
            notify.from.as_deref(),
        )?)),
    })
}

pub fn state_store(settings: &Settings) -> Result<FileStateStore> {
    Ok(FileStateStore::new(settings.state_path()?))
}
