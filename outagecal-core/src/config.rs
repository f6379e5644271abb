//! Settings at ~/.config/outagecal/config.toml, overridable from the
//! environment (`OUTAGECAL_QUEUE=1.1`, `OUTAGECAL_CALENDAR__NAME=...`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_BLOCK_SELECTOR, DEFAULT_CALDAV_URL, DEFAULT_CALENDAR_NAME, DEFAULT_CALENDAR_TIMEOUT,
    DEFAULT_EMPTY_MARKER, DEFAULT_EVENT_PREFIX, DEFAULT_FETCH_TIMEOUT, DEFAULT_QUEUE,
    DEFAULT_SMTP_PORT, DEFAULT_SOURCE_URL, DEFAULT_TIMEZONE,
};
use crate::error::{OutageError, OutageResult};
use crate::notify::SmtpOptions;
use crate::parse::ParserOptions;
use crate::schedule::QueueId;

const ENV_PREFIX: &str = "OUTAGECAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Http,
    /// The page builds its schedule with scripts, so rendering is the default.
    #[default]
    Chromium,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMethod {
    #[default]
    None,
    Log,
    Smtp,
    Sendmail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarBackend {
    #[default]
    CalDav,
    Provider,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub method: FetchMethod,
    /// Browser executable for the `chromium` method.
    pub chromium: String,
    /// Saved page for the `file` method.
    pub file: Option<PathBuf>,
    pub timeout: String,
    pub block_selector: String,
    pub empty_marker: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            method: FetchMethod::default(),
            chromium: "chromium".into(),
            file: None,
            timeout: DEFAULT_FETCH_TIMEOUT.into(),
            block_selector: DEFAULT_BLOCK_SELECTOR.into(),
            empty_marker: DEFAULT_EMPTY_MARKER.into(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> OutageResult<Duration> {
        parse_duration("fetch.timeout", &self.timeout)
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.file.as_deref().map(expand_path)
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            block_selector: self.block_selector.clone(),
            empty_marker: self.empty_marker.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub backend: CalendarBackend,
    pub name: String,
    pub timeout: String,
    /// CalDAV server; the calendar is looked up by `name` under the account.
    pub url: String,
    /// CalDAV collection URL, skipping the lookup by name.
    pub calendar_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Provider executable: an absolute path or a name on `PATH`.
    pub provider: Option<String>,
    /// Everything else in `[calendar]` is passed through to the provider.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        CalendarSettings {
            backend: CalendarBackend::default(),
            name: DEFAULT_CALENDAR_NAME.into(),
            timeout: DEFAULT_CALENDAR_TIMEOUT.into(),
            url: DEFAULT_CALDAV_URL.into(),
            calendar_url: None,
            username: None,
            password: None,
            provider: None,
            params: serde_json::Map::new(),
        }
    }
}

impl CalendarSettings {
    pub fn timeout(&self) -> OutageResult<Duration> {
        parse_duration("calendar.timeout", &self.timeout)
    }

    /// CalDAV username and password; both are required.
    pub fn credentials(&self) -> OutageResult<(&str, &str)> {
        let username = non_blank(self.username.as_deref());
        let password = non_blank(self.password.as_deref());
        match (username, password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(OutageError::Config(
                "calendar.username and calendar.password are required for CalDAV".into(),
            )),
        }
    }

    pub fn provider(&self) -> OutageResult<&str> {
        self.provider
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                OutageError::Config("calendar.provider is not set; see `outagecal init`".into())
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub method: NotifyMethod,
    pub to: Option<String>,
    pub from: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_use_tls: bool,
    pub sendmail: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        NotifySettings {
            method: NotifyMethod::default(),
            to: None,
            from: None,
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_user: None,
            smtp_password: None,
            smtp_use_tls: true,
            sendmail: "sendmail".into(),
        }
    }
}

impl NotifySettings {
    pub fn smtp_options(&self) -> SmtpOptions {
        SmtpOptions {
            host: self.smtp_host.clone().unwrap_or_default(),
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
            use_tls: self.smtp_use_tls,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source_url: String,
    pub queue: String,
    pub timezone: String,
    pub state_file: Option<PathBuf>,
    pub event_prefix: String,
    pub log_extracted_events: bool,
    pub clear_missing_today: bool,
    pub fetch: FetchSettings,
    pub calendar: CalendarSettings,
    pub notify: NotifySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source_url: DEFAULT_SOURCE_URL.into(),
            queue: DEFAULT_QUEUE.into(),
            timezone: DEFAULT_TIMEZONE.into(),
            state_file: None,
            event_prefix: DEFAULT_EVENT_PREFIX.into(),
            log_extracted_events: false,
            clear_missing_today: false,
            fetch: FetchSettings::default(),
            calendar: CalendarSettings::default(),
            notify: NotifySettings::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> OutageResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| OutageError::Config("Could not determine config directory".into()))?
            .join("outagecal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load settings from `path` (or the default location) and the
    /// environment. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> OutageResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };
        Self::build(&path, required, environment())
    }

    fn build(path: &Path, required: bool, env: Environment) -> OutageResult<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(env)
            .build()
            .map_err(|e| OutageError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| OutageError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> OutageResult<()> {
        self.tz()?;
        self.queue_id()?;
        self.fetch.timeout()?;
        self.calendar.timeout()?;

        if self.event_prefix.trim().is_empty() {
            return Err(OutageError::Config("event_prefix must not be empty".into()));
        }
        if self.fetch.method == FetchMethod::File && self.fetch.file.is_none() {
            return Err(OutageError::Config(
                "fetch.file is required when fetch.method = \"file\"".into(),
            ));
        }
        let emails = matches!(self.notify.method, NotifyMethod::Smtp | NotifyMethod::Sendmail);
        if emails && non_blank(self.notify.to.as_deref()).is_none() {
            return Err(OutageError::Config(
                "notify.to is required for email notifications".into(),
            ));
        }
        if self.notify.method == NotifyMethod::Smtp && non_blank(self.notify.smtp_host.as_deref()).is_none() {
            return Err(OutageError::Config(
                "notify.smtp_host is required when notify.method = \"smtp\"".into(),
            ));
        }
        Ok(())
    }

    pub fn tz(&self) -> OutageResult<Tz> {
        self.timezone
            .parse()
            .map_err(|_| OutageError::Config(format!("Unknown time zone '{}'", self.timezone)))
    }

    pub fn queue_id(&self) -> OutageResult<QueueId> {
        QueueId::new(&self.queue)
            .ok_or_else(|| OutageError::Config(format!("Invalid queue '{}'", self.queue)))
    }

    /// The state file, defaulting to `<data_dir>/outagecal/state.json`.
    pub fn state_path(&self) -> OutageResult<PathBuf> {
        if let Some(path) = &self.state_file {
            return Ok(expand_path(path));
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| OutageError::Config("Could not determine data directory".into()))?;
        Ok(data_dir.join("outagecal").join("state.json"))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> OutageResult<()> {
        let contents = format!(
            "\
# outagecal configuration
# Every key can also be set from the environment, e.g. OUTAGECAL_QUEUE=1.1
# or OUTAGECAL_CALENDAR__NAME=\"Power Outage\".

# Page publishing the schedule:
# source_url = \"{source_url}\"

# Your outage queue (group), as printed on the page:
# queue = \"{queue}\"

# Time zone the schedule is published in:
# timezone = \"{timezone}\"

# Where sync state is kept (defaults to the user data directory):
# state_file = \"~/.local/share/outagecal/state.json\"

# Titles of created events start with this; only such events are ever deleted:
# event_prefix = \"{event_prefix}\"

# Log every extracted day and queue:
# log_extracted_events = false

# Remove today's events when the page has no schedule for today:
# clear_missing_today = false

[fetch]
# chromium (renders scripts), http (server-rendered pages only) or file (saved snapshot):
# method = \"chromium\"
# chromium = \"chromium\"
# file = \"~/outage.html\"
# timeout = \"{fetch_timeout}\"
# block_selector = \"{block_selector}\"
# empty_marker = \"{empty_marker}\"

[calendar]
# caldav (talk to the server directly) or provider (external executable):
# backend = \"caldav\"
# name = \"{calendar_name}\"
# timeout = \"{calendar_timeout}\"
# CalDAV server and account (for iCloud, use an app-specific password):
# url = \"{caldav_url}\"
# username = \"me@icloud.com\"
# password = \"xxxx-xxxx-xxxx-xxxx\"
# Skip the lookup by name and use this collection directly:
# calendar_url = \"https://caldav.example.com/calendars/me/outages/\"
# With backend = \"provider\", an executable speaking the outagecal JSON
# protocol; any other keys here are passed to it as-is:
# provider = \"/usr/local/bin/my-calendar-provider\"

[notify]
# none, log, smtp or sendmail:
# method = \"none\"
# to = \"me@example.com\"
# from = \"outagecal@example.com\"
# smtp_host = \"smtp.example.com\"
# smtp_port = {smtp_port}
# smtp_user = \"outagecal@example.com\"
# smtp_password = \"secret\"
# smtp_use_tls = true
# sendmail = \"sendmail\"
",
            source_url = DEFAULT_SOURCE_URL,
            queue = DEFAULT_QUEUE,
            timezone = DEFAULT_TIMEZONE,
            event_prefix = DEFAULT_EVENT_PREFIX,
            fetch_timeout = DEFAULT_FETCH_TIMEOUT,
            block_selector = DEFAULT_BLOCK_SELECTOR,
            empty_marker = DEFAULT_EMPTY_MARKER,
            calendar_name = DEFAULT_CALENDAR_NAME,
            calendar_timeout = DEFAULT_CALENDAR_TIMEOUT,
            caldav_url = DEFAULT_CALDAV_URL,
            smtp_port = DEFAULT_SMTP_PORT,
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OutageError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| OutageError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn parse_duration(key: &str, value: &str) -> OutageResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| OutageError::Config(format!("Invalid {} '{}': {}", key, value, e)))
}
