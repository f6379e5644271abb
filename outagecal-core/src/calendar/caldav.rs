//! Calendar store talking CalDAV directly (iCloud, Fastmail, Nextcloud, ...).
//!
//! The calendar collection is found by display name under the account's
//! calendar home (principal → calendar-home-set → collections), unless its
//! URL is configured. Events are listed with a time-range `calendar-query`
//! REPORT, created with a conditional PUT and removed with DELETE.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use reqwest::{Method, StatusCode, Url};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::calendar::ics::{generate_ics, parse_event};
use crate::calendar::{CalendarEvent, CalendarStore, NewEvent, localize};
use crate::constants::USER_AGENT;
use crate::error::{OutageError, OutageResult};

const PRINCIPAL_QUERY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:current-user-principal/>
  </d:prop>
</d:propfind>"#;

const HOME_QUERY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <c:calendar-home-set/>
  </d:prop>
</d:propfind>"#;

const CALENDARS_QUERY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

pub struct CalDavCalendarStore {
    client: reqwest::Client,
    server: Url,
    username: String,
    password: String,
    calendar: String,
    tz: Tz,
    collection: OnceCell<Url>,
}

impl CalDavCalendarStore {
    pub fn new(
        server: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        calendar: impl Into<String>,
        tz: Tz,
        timeout: Duration,
    ) -> OutageResult<Self> {
        let server = Url::parse(server)
            .map_err(|e| OutageError::Config(format!("Invalid CalDAV URL '{}': {}", server, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| OutageError::CalDav(format!("Failed to build HTTP client: {}", e)))?;

        Ok(CalDavCalendarStore {
            client,
            server,
            username: username.into(),
            password: password.into(),
            calendar: calendar.into(),
            tz,
            collection: OnceCell::new(),
        })
    }

    /// Use this collection instead of looking the calendar up by name.
    pub fn with_collection_url(self, url: &str) -> OutageResult<Self> {
        let url = Url::parse(&with_trailing_slash(url))
            .map_err(|e| OutageError::Config(format!("Invalid calendar URL '{}': {}", url, e)))?;
        Ok(CalDavCalendarStore {
            collection: OnceCell::new_with(Some(url)),
            ..self
        })
    }

    async fn collection(&self) -> OutageResult<&Url> {
        self.collection.get_or_try_init(|| self.discover()).await
    }

    async fn discover(&self) -> OutageResult<Url> {
        let (base, body) = self.propfind(self.server.clone(), "0", PRINCIPAL_QUERY).await?;
        let principal = match prop_href(&body, "current-user-principal")? {
            Some(href) => resolve(&base, &href)?,
            None => base,
        };

        let (base, body) = self.propfind(principal, "0", HOME_QUERY).await?;
        let home = prop_href(&body, "calendar-home-set")?
            .ok_or_else(|| OutageError::CalDav("Server did not report a calendar home".into()))?;
        let home = resolve(&base, &with_trailing_slash(&home))?;

        let (base, body) = self.propfind(home, "1", CALENDARS_QUERY).await?;
        let href = calendar_href(&body, &self.calendar)?
            .ok_or_else(|| OutageError::CalDav(format!("Calendar '{}' not found", self.calendar)))?;
        let collection = resolve(&base, &with_trailing_slash(&href))?;

        debug!(calendar = %self.calendar, url = %collection, "Found CalDAV calendar");
        Ok(collection)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Send a PROPFIND; returns the final URL (after redirects) and the body.
    async fn propfind(&self, url: Url, depth: &str, body: &'static str) -> OutageResult<(Url, String)> {
        let method = dav_method(b"PROPFIND")?;
        self.xml_request(method, url, depth, body.to_string()).await
    }

    async fn xml_request(
        &self,
        method: Method,
        url: Url,
        depth: &str,
        body: String,
    ) -> OutageResult<(Url, String)> {
        let label = format!("{} {}", method, url);
        let response = self
            .request(method, url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", depth)
            .body(body)
            .send()
            .await
            .map_err(|e| OutageError::CalDav(format!("{}: {}", label, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OutageError::CalDav(format!(
                "{} was refused (HTTP {}); check calendar.username and calendar.password",
                label, status
            )));
        }
        if !status.is_success() {
            return Err(OutageError::CalDav(format!("{} returned HTTP {}", label, status)));
        }

        let final_url = response.url().clone();
        let text = response
            .text()
            .await
            .map_err(|e| OutageError::CalDav(format!("Reading {}: {}", label, e)))?;
        Ok((final_url, text))
    }

    fn utc(&self, local: NaiveDateTime) -> OutageResult<DateTime<Utc>> {
        localize(self.tz, local)
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| OutageError::CalDav(format!("{} does not exist in {}", local, self.tz)))
    }
}

#[async_trait]
impl CalendarStore for CalDavCalendarStore {
    async fn list_events(&self, date: NaiveDate) -> OutageResult<Vec<CalendarEvent>> {
        let collection = self.collection().await?.clone();
        let from = self.utc(date.and_time(NaiveTime::MIN))?;
        let to = self.utc((date + ChronoDuration::days(1)).and_time(NaiveTime::MIN))?;

        let (base, body) = self
            .xml_request(
                dav_method(b"REPORT")?,
                collection,
                "1",
                calendar_query(&caldav_time(from), &caldav_time(to)),
            )
            .await?;

        let mut events = Vec::new();
        for resource in calendar_resources(&body)? {
            let Some(parsed) = parse_event(&resource.data, self.tz) else {
                debug!(href = %resource.href, "Skipping unreadable calendar resource");
                continue;
            };
            if parsed.start.date() != date {
                continue;
            }
            events.push(CalendarEvent {
                id: resolve(&base, &resource.href)?.path().to_string(),
                date,
                start: parsed.start,
                end: parsed.end,
                title: parsed.summary,
            });
        }
        Ok(events)
    }

    async fn create_event(&self, event: &NewEvent) -> OutageResult<CalendarEvent> {
        let collection = self.collection().await?;
        let uid = format!("outagecal-{}", uuid::Uuid::new_v4());
        let url = resolve(collection, &format!("{}.ics", uid))?;
        let ics = generate_ics(
            &uid,
            &event.title,
            &event.description,
            self.utc(event.start)?,
            self.utc(event.end)?,
        );

        let response = self
            .request(Method::PUT, url.clone())
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header("If-None-Match", "*")
            .body(ics)
            .send()
            .await
            .map_err(|e| OutageError::CalDav(format!("PUT {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(OutageError::CalDav(format!(
                "PUT {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        Ok(CalendarEvent {
            id: url.path().to_string(),
            date: event.date,
            start: event.start,
            end: event.end,
            title: event.title.clone(),
        })
    }

    async fn delete_event(&self, event: &CalendarEvent) -> OutageResult<()> {
        let url = resolve(self.collection().await?, &event.id)?;
        let response = self
            .request(Method::DELETE, url.clone())
            .send()
            .await
            .map_err(|e| OutageError::CalDav(format!("DELETE {}: {}", url, e)))?;

        // Already gone is as good as deleted.
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(OutageError::CalDav(format!("DELETE {} returned HTTP {}", url, status)));
        }
        Ok(())
    }
}

fn dav_method(name: &[u8]) -> OutageResult<Method> {
    Method::from_bytes(name).map_err(|e| OutageError::CalDav(e.to_string()))
}

fn resolve(base: &Url, href: &str) -> OutageResult<Url> {
    base.join(href)
        .map_err(|e| OutageError::CalDav(format!("Bad href '{}': {}", href, e)))
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// `YYYYMMDDTHHMMSSZ`, as CalDAV time-range filters expect.
fn caldav_time(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

fn calendar_query(start: &str, end: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag/>
    <c:calendar-data/>
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{start}" end="{end}"/>
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#
    )
}

/// A resource from a `calendar-query` multistatus.
#[derive(Debug)]
struct CalendarResource {
    href: String,
    data: String,
}

fn parse_xml(body: &str) -> OutageResult<roxmltree::Document<'_>> {
    roxmltree::Document::parse(body)
        .map_err(|e| OutageError::CalDav(format!("Malformed multistatus response: {}", e)))
}

fn child_text<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<&'a str> {
    node.descendants()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The `href` inside the first `prop` element, if the server sent one.
fn prop_href(body: &str, prop: &str) -> OutageResult<Option<String>> {
    let doc = parse_xml(body)?;
    Ok(doc
        .descendants()
        .find(|n| n.tag_name().name() == prop)
        .and_then(|n| child_text(n, "href"))
        .map(str::to_string))
}

/// Href of the calendar collection whose display name is `name`.
fn calendar_href(body: &str, name: &str) -> OutageResult<Option<String>> {
    let doc = parse_xml(body)?;
    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
        .find(|response| {
            let is_calendar = response
                .descendants()
                .filter(|n| n.tag_name().name() == "resourcetype")
                .flat_map(|n| n.children())
                .any(|n| n.tag_name().name() == "calendar");
            is_calendar && child_text(*response, "displayname") == Some(name)
        })
        .and_then(|response| child_text(response, "href"))
        .map(str::to_string))
}

fn calendar_resources(body: &str) -> OutageResult<Vec<CalendarResource>> {
    let doc = parse_xml(body)?;
    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
        .filter_map(|response| {
            Some(CalendarResource {
                href: child_text(response, "href")?.to_string(),
                data: child_text(response, "calendar-data")?.to_string(),
            })
        })
        .collect())
}
