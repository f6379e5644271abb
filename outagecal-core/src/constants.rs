/// Page that publishes the hourly outage schedule.
pub const DEFAULT_SOURCE_URL: &str = "https://poweron.loe.lviv.ua/";

pub const DEFAULT_QUEUE: &str = "1";

pub const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";

pub const DEFAULT_EVENT_PREFIX: &str = "Power outage";

pub const DEFAULT_CALENDAR_NAME: &str = "Power Outage";

/// Elements holding one day's schedule text.
pub const DEFAULT_BLOCK_SELECTOR: &str = ".power-off__text";

/// Container present on the page even when no schedule is published.
pub const DEFAULT_EMPTY_MARKER: &str = ".power-off";

/// Pages shorter than this (after trimming) are treated as failed renders.
pub const MIN_PAGE_LEN: usize = 50;

pub const DEFAULT_FETCH_TIMEOUT: &str = "3m";

pub const DEFAULT_CALENDAR_TIMEOUT: &str = "30s";

pub const DEFAULT_CALDAV_URL: &str = "https://caldav.icloud.com/";

/// Submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Virtual time headless Chromium may spend running page scripts before
/// dumping the DOM.
pub const CHROMIUM_VIRTUAL_TIME_BUDGET_MS: u64 = 15_000;

pub const USER_AGENT: &str = concat!("outagecal/", env!("CARGO_PKG_VERSION"));
