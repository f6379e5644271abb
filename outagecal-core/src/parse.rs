//! Schedule page parsing.
//!
//! The source page renders one `.power-off__text` block per day. Each block
//! starts with a header such as `Графік погодинних відключень на 18.10.2026`,
//! may carry an update timestamp, and lists one line per outage queue:
//!
//! ```text
//! Група 1.1. Електроенергії немає з 09:00 до 13:00, з 18:00 до 22:00.
//! Група 1.2. Електроенергія є.
//! ```
//!
//! Problems inside a block degrade to warnings. Only a page that cannot be
//! recognized at all is an error.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::constants::{DEFAULT_BLOCK_SELECTOR, DEFAULT_EMPTY_MARKER, MIN_PAGE_LEN};
use crate::error::{OutageError, OutageResult};
use crate::schedule::{DaySchedule, MINUTES_PER_DAY, QueueId, TimeRange, normalize, parse_clock};

static RE_HEADER_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)графік\s+погодинних\s+відключень\s+на\s+(\d{1,2})[./-](\d{1,2})(?:[./-](\d{2,4}))?")
        .expect("valid header pattern")
});

static RE_QUEUE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:група|черг[аи]|queue)\s*[:#№]?\s*(\d+(?:\.\d+)*)")
        .expect("valid queue label pattern")
});

static RE_TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:з\s*)?(\d{1,2}:\d{2})\s*(?:-|–|—|до)\s*(\d{1,2}:\d{2})")
        .expect("valid time range pattern")
});

static RE_CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("valid clock pattern"));

static RE_DATE_THEN_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})[./-](\d{1,2})[./-](\d{2,4})\s+(\d{1,2}:\d{2})")
        .expect("valid timestamp pattern")
});

static RE_TIME_THEN_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}:\d{2})\s+(\d{1,2})[./-](\d{1,2})[./-](\d{2,4})")
        .expect("valid timestamp pattern")
});

/// Elements that start a new line of text inside a block.
const LINE_BREAKING_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "tr", "table", "section", "article", "header", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// CSS selectors describing the page layout.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub block_selector: String,
    /// Present on the page even when nothing is scheduled.
    pub empty_marker: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            block_selector: DEFAULT_BLOCK_SELECTOR.to_string(),
            empty_marker: DEFAULT_EMPTY_MARKER.to_string(),
        }
    }
}

/// A recoverable problem found while parsing; the affected data is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub date: Option<NaiveDate>,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{}: {}", date, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Everything extracted from one page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Days found on the page (today and/or tomorrow), sorted by date.
    pub days: Vec<DaySchedule>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedPage {
    pub fn day(&self, date: NaiveDate) -> Option<&DaySchedule> {
        self.days.iter().find(|d| d.date == date)
    }
}

pub struct ScheduleParser {
    blocks: Selector,
    empty_marker: Selector,
}

impl ScheduleParser {
    pub fn new(options: &ParserOptions) -> OutageResult<Self> {
        Ok(ScheduleParser {
            blocks: parse_selector(&options.block_selector)?,
            empty_marker: parse_selector(&options.empty_marker)?,
        })
    }

    /// Extract the schedules for `today` and the day after from `html`.
    ///
    /// Blocks for any other date are discarded.
    pub fn parse(&self, html: &str, today: NaiveDate) -> OutageResult<ParsedPage> {
        if html.trim().len() < MIN_PAGE_LEN {
            return Err(OutageError::Parse(
                "Page HTML is empty; could not read schedule".into(),
            ));
        }

        let document = Html::parse_document(html);
        let blocks: Vec<ElementRef> = document.select(&self.blocks).collect();

        if blocks.is_empty() {
            if document.select(&self.empty_marker).next().is_some() {
                debug!("No schedule blocks on the page, nothing published");
                return Ok(ParsedPage::default());
            }
            return Err(OutageError::Parse(
                "No schedule blocks found and the page layout is not recognized".into(),
            ));
        }

        let mut page = ParsedPage::default();
        let mut by_date: BTreeMap<NaiveDate, DaySchedule> = BTreeMap::new();

        for block in blocks {
            let lines = block_lines(block);
            if lines.is_empty() {
                continue;
            }

            let Some(day) = parse_block(&lines, today, &mut page.warnings) else {
                continue;
            };

            // Several blocks for one day: the most recently updated wins.
            match by_date.get(&day.date) {
                Some(existing) if existing.updated_at > day.updated_at => {
                    debug!(date = %day.date, "Ignoring older duplicate schedule block");
                }
                _ => {
                    by_date.insert(day.date, day);
                }
            }
        }

        page.days = by_date.into_values().collect();
        Ok(page)
    }
}

fn parse_selector(selector: &str) -> OutageResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| OutageError::Config(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

/// Split a block into visual lines with collapsed whitespace.
fn block_lines(block: ElementRef) -> Vec<String> {
    let mut text = String::new();
    collect_text(block, &mut text);

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            // Source newlines are plain whitespace; lines come from markup.
            out.push_str(&text.replace(['\n', '\r'], " "));
            continue;
        }

        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();

        if name == "br" {
            out.push('\n');
            continue;
        }
        if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        }

        let breaks_line = LINE_BREAKING_ELEMENTS.contains(&name);
        if breaks_line {
            out.push('\n');
        }
        collect_text(child, out);
        if breaks_line {
            out.push('\n');
        }
    }
}

fn parse_block(
    lines: &[String],
    today: NaiveDate,
    warnings: &mut Vec<ParseWarning>,
) -> Option<DaySchedule> {
    let Some(date) = header_date(lines, today) else {
        warnings.push(ParseWarning {
            date: None,
            message: format!(
                "Skipped schedule block without a recognizable date: '{}'",
                lines[0]
            ),
        });
        return None;
    };

    let tomorrow = today + Duration::days(1);
    if date != today && date != tomorrow {
        debug!(%date, "Discarding schedule block outside today/tomorrow");
        return None;
    }

    let updated_at = updated_at(lines);
    let queue_ranges = queue_ranges(lines, date, warnings);

    Some(DaySchedule {
        date,
        updated_at,
        queue_ranges,
    })
}

fn header_date(lines: &[String], today: NaiveDate) -> Option<NaiveDate> {
    lines.iter().find_map(|line| {
        let caps = RE_HEADER_DATE.captures(line)?;
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        match caps.get(3) {
            Some(year) => NaiveDate::from_ymd_opt(expand_year(year.as_str())?, month, day),
            None => resolve_without_year(day, month, today),
        }
    })
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    match raw.len() {
        2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

/// Use the current year, except that `01.01` seen on 31 December is tomorrow.
fn resolve_without_year(day: u32, month: u32, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    let tomorrow = today + Duration::days(1);
    if tomorrow.year() != today.year() && this_year != Some(today) {
        if let Some(next_year) = NaiveDate::from_ymd_opt(today.year() + 1, month, day) {
            if next_year == tomorrow {
                return Some(next_year);
            }
        }
    }
    this_year
}

fn updated_at(lines: &[String]) -> Option<NaiveDateTime> {
    lines.iter().find_map(|line| {
        if let Some(caps) = RE_DATE_THEN_TIME.captures(line) {
            if let Some(ts) = timestamp(&caps[1], &caps[2], &caps[3], &caps[4]) {
                return Some(ts);
            }
        }
        let caps = RE_TIME_THEN_DATE.captures(line)?;
        timestamp(&caps[2], &caps[3], &caps[4], &caps[1])
    })
}

fn timestamp(day: &str, month: &str, year: &str, clock: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(expand_year(year)?, month.parse().ok()?, day.parse().ok()?)?;
    let minutes = parse_clock(clock).filter(|m| *m < MINUTES_PER_DAY)?;
    let time = NaiveTime::from_hms_opt(u32::from(minutes / 60), u32::from(minutes % 60), 0)?;
    Some(date.and_time(time))
}

fn queue_ranges(
    lines: &[String],
    date: NaiveDate,
    warnings: &mut Vec<ParseWarning>,
) -> BTreeMap<QueueId, Vec<TimeRange>> {
    let mut labelled: BTreeMap<QueueId, Vec<TimeRange>> = BTreeMap::new();
    let mut malformed: HashSet<QueueId> = HashSet::new();
    let mut unlabelled: Vec<Vec<TimeRange>> = Vec::new();

    for line in lines {
        if RE_HEADER_DATE.is_match(line) {
            continue;
        }

        let Some(caps) = RE_QUEUE_LABEL.captures(line) else {
            // Unlabelled lines only count when they hold complete ranges;
            // update stamps and prose are ignored.
            if let Ok(found) = line_ranges(line) {
                if !found.ranges.is_empty() {
                    unlabelled.push(found.ranges);
                }
            }
            continue;
        };

        let Some(queue) = QueueId::new(&caps[1]) else {
            continue;
        };
        let rest = &line[caps.get(0).map_or(0, |m| m.end())..];

        match line_ranges(rest) {
            Ok(found) => {
                for fragment in found.clipped {
                    warnings.push(ParseWarning {
                        date: Some(date),
                        message: format!(
                            "Queue {}: range '{}' crosses midnight, cut at 24:00",
                            queue, fragment
                        ),
                    });
                }
                if !malformed.contains(&queue) {
                    labelled.entry(queue).or_default().extend(found.ranges);
                }
            }
            Err(fragment) => {
                warnings.push(ParseWarning {
                    date: Some(date),
                    message: format!(
                        "Queue {}: malformed time '{}' in line '{}'",
                        queue, fragment, line
                    ),
                });
                labelled.insert(queue.clone(), Vec::new());
                malformed.insert(queue);
            }
        }
    }

    if labelled.is_empty() && !unlabelled.is_empty() {
        debug!(%date, "No queue labels in block, numbering lines by position");
        labelled = unlabelled
            .into_iter()
            .enumerate()
            .filter_map(|(i, ranges)| QueueId::new(&(i + 1).to_string()).map(|q| (q, ranges)))
            .collect();
    }

    if labelled.is_empty() {
        warnings.push(ParseWarning {
            date: Some(date),
            message: "Schedule block lists no outage queues".into(),
        });
    }

    labelled
        .into_iter()
        .map(|(queue, ranges)| (queue, normalize(ranges)))
        .collect()
}

struct LineRanges {
    ranges: Vec<TimeRange>,
    /// Source fragments that crossed midnight and were cut at 24:00.
    clipped: Vec<String>,
}

/// Extract every range on a line.
///
/// Fails with the offending fragment when a time is invalid or a time has
/// no partner to form a range.
fn line_ranges(text: &str) -> Result<LineRanges, String> {
    let mut found = LineRanges {
        ranges: Vec::new(),
        clipped: Vec::new(),
    };
    let mut paired_clocks = 0;

    for caps in RE_TIME_RANGE.captures_iter(text) {
        paired_clocks += 2;
        let fragment = caps[0].trim().to_string();

        let start = parse_clock(&caps[1]).filter(|m| *m < MINUTES_PER_DAY);
        let end = parse_clock(&caps[2]);
        let (Some(start), Some(end)) = (start, end) else {
            return Err(fragment);
        };

        let end = match end {
            0 => MINUTES_PER_DAY,
            e if e > start => e,
            e if e < start => {
                found.clipped.push(fragment.clone());
                MINUTES_PER_DAY
            }
            _ => return Err(fragment),
        };

        let range = TimeRange::new(start, end).ok_or_else(|| fragment.clone())?;
        found.ranges.push(range);
    }

    if RE_CLOCK.find_iter(text).count() != paired_clocks {
        return Err(text.trim().to_string());
    }

    Ok(found)
}
