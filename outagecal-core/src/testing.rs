//! In-memory collaborators for tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::calendar::{CalendarEvent, CalendarStore, NewEvent};
use crate::error::{OutageError, OutageResult};
use crate::fetch::PageFetcher;
use crate::notify::{ChangeNotice, Notifier};

/// A page with one `.power-off__text` block per entry.
pub fn page(blocks: &[&str]) -> String {
    let body: String = blocks
        .iter()
        .map(|b| format!("<div class=\"power-off__text\">{}</div>", b))
        .collect();
    format!(
        "<html><head><title>Графік</title></head><body><div class=\"power-off\">{}</div></body></html>",
        body
    )
}

pub struct StaticFetcher {
    html: Option<String>,
}

impl StaticFetcher {
    pub fn new(html: impl Into<String>) -> Self {
        StaticFetcher {
            html: Some(html.into()),
        }
    }

    pub fn failing() -> Self {
        StaticFetcher { html: None }
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self) -> OutageResult<String> {
        self.html
            .clone()
            .ok_or_else(|| OutageError::Fetch("connection refused".into()))
    }

    fn source(&self) -> String {
        "memory".into()
    }
}

#[derive(Default)]
struct CalendarInner {
    events: Vec<CalendarEvent>,
    next_id: usize,
    writes: usize,
}

/// Calendar kept in memory, with per-date failure injection.
#[derive(Default)]
pub struct MemoryCalendar {
    inner: Mutex<CalendarInner>,
    fail_list: Mutex<HashSet<NaiveDate>>,
    fail_create: Mutex<HashSet<NaiveDate>>,
}

impl MemoryCalendar {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let calendar = MemoryCalendar::default();
        calendar.inner.lock().unwrap().events = events;
        calendar
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn events_on(&self, date: NaiveDate) -> Vec<CalendarEvent> {
        self.events().into_iter().filter(|e| e.date == date).collect()
    }

    /// Number of successful creates and deletes.
    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    pub fn fail_list_on(&self, date: NaiveDate) {
        self.fail_list.lock().unwrap().insert(date);
    }

    pub fn fail_create_on(&self, date: NaiveDate) {
        self.fail_create.lock().unwrap().insert(date);
    }

    pub fn heal(&self) {
        self.fail_list.lock().unwrap().clear();
        self.fail_create.lock().unwrap().clear();
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendar {
    async fn list_events(&self, date: NaiveDate) -> OutageResult<Vec<CalendarEvent>> {
        if self.fail_list.lock().unwrap().contains(&date) {
            return Err(OutageError::Provider("list failed".into()));
        }
        Ok(self.events_on(date))
    }

    async fn create_event(&self, event: &NewEvent) -> OutageResult<CalendarEvent> {
        if self.fail_create.lock().unwrap().contains(&event.date) {
            return Err(OutageError::Provider("create failed".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let created = CalendarEvent {
            id: format!("evt-{}", inner.next_id),
            date: event.date,
            start: event.start,
            end: event.end,
            title: event.title.clone(),
        };
        inner.events.push(created.clone());
        inner.writes += 1;
        Ok(created)
    }

    async fn delete_event(&self, event: &CalendarEvent) -> OutageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.events.len();
        inner.events.retain(|e| e.id != event.id);
        if inner.events.len() == before {
            return Err(OutageError::Provider(format!("no event {}", event.id)));
        }
        inner.writes += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<ChangeNotice>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        RecordingNotifier {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<ChangeNotice> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &ChangeNotice) -> OutageResult<()> {
        self.sent.lock().unwrap().push(notice.clone());
        if self.fail {
            return Err(OutageError::Notify("smtp unreachable".into()));
        }
        Ok(())
    }
}

/// A request seen by [`ScriptedServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP/1.1 server on localhost answering each connection with the next
/// scripted `(status, body)` pair, then 500 once the script runs out.
pub struct ScriptedServer {
    url: String,
    requests: std::sync::Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start(script: Vec<(u16, String)>) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let task = tokio::spawn(async move {
            let mut script = script.into_iter();
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break buf.len(),
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
                let mut lines = head.lines();
                let mut request_line = lines.next().unwrap_or_default().split_whitespace();
                let method = request_line.next().unwrap_or_default().to_string();
                let path = request_line.next().unwrap_or_default().to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|line| line.split_once(':'))
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .collect();
                let length = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);

                while buf.len() < header_end + length {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let body_end = buf.len().min(header_end + length);
                let body = String::from_utf8_lossy(&buf[header_end..body_end]).into_owned();

                recorded.lock().unwrap().push(RecordedRequest {
                    method,
                    path,
                    headers,
                    body,
                });

                let (status, body) = script.next().unwrap_or((500, "script exhausted".into()));
                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        ScriptedServer {
            url,
            requests,
            task,
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
