//! iCalendar payloads for outage events.

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold};
use icalendar::{Calendar, CalendarDateTime, Component, DatePerhapsTime};

use crate::calendar::localize;

/// A VEVENT as read back from the server, in local wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// A VCALENDAR with one VEVENT. Times are written in UTC.
pub fn generate_ics(
    uid: &str,
    summary: &str,
    description: &str,
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
) -> String {
    let mut event = icalendar::Event::new();
    event.uid(uid);
    event.summary(summary);
    event.description(description);
    event.add_property("DTSTAMP", Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
    event.add_property("DTSTART", start.format("%Y%m%dT%H%M%SZ").to_string());
    event.add_property("DTEND", end.format("%Y%m%dT%H%M%SZ").to_string());

    let mut calendar = Calendar::new();
    calendar.push(event.done());
    calendar.done().to_string()
}

/// The first VEVENT of `content`, with its times moved into `tz`.
/// Returns `None` for anything without a start and end.
pub fn parse_event(content: &str, tz: Tz) -> Option<ParsedEvent> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let start = DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?;
    let end = DatePerhapsTime::try_from(vevent.find_prop("DTEND")?).ok()?;

    Some(ParsedEvent {
        summary,
        start: to_local(start, tz)?,
        end: to_local(end, tz)?,
    })
}

fn to_local(time: DatePerhapsTime, tz: Tz) -> Option<NaiveDateTime> {
    match time {
        DatePerhapsTime::Date(date) => Some(date.and_time(chrono::NaiveTime::MIN)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(dt.with_timezone(&tz).naive_local()),
        // Floating times are taken to be in the schedule's zone.
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Some(naive),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            match tzid.parse::<Tz>() {
                Ok(event_tz) => event_tz
                    .from_local_datetime(&date_time)
                    .earliest()
                    .map(|dt| dt.with_timezone(&tz).naive_local()),
                Err(_) => localize(tz, date_time).map(|dt| dt.naive_local()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_generated_event_reads_back() {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 6, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap();
        let ics = generate_ics(
            "outagecal-1",
            "Power outage (Queue 1.1)",
            "Scheduled outage for queue 1.1",
            start,
            end,
        );

        assert!(ics.contains("UID:outagecal-1"));
        assert!(ics.contains("DTSTART:20260701T060000Z"));
        assert!(ics.contains("DESCRIPTION:Scheduled outage for queue 1.1"));

        let parsed = parse_event(&ics, chrono_tz::Europe::Kyiv).unwrap();
        assert_eq!(parsed.summary, "Power outage (Queue 1.1)");
        assert_eq!(parsed.start, at(9, 0));
        assert_eq!(parsed.end, at(13, 0));
    }

    #[test]
    fn test_zoned_and_floating_times() {
        let zoned = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Power outage (Queue 2)\r\n\
                     DTSTART;TZID=Europe/Warsaw:20260701T080000\r\nDTEND;TZID=Europe/Warsaw:20260701T100000\r\n\
                     END:VEVENT\r\nEND:VCALENDAR\r\n";
        let parsed = parse_event(zoned, chrono_tz::Europe::Kyiv).unwrap();
        assert_eq!((parsed.start, parsed.end), (at(9, 0), at(11, 0)));

        let floating = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:y\r\nSUMMARY:Lunch\r\n\
                        DTSTART:20260701T120000\r\nDTEND:20260701T130000\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let parsed = parse_event(floating, chrono_tz::Europe::Kyiv).unwrap();
        assert_eq!((parsed.start, parsed.end), (at(12, 0), at(13, 0)));
    }

    #[test]
    fn test_event_without_times_is_skipped() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:z\r\nSUMMARY:Todo\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        assert!(parse_event(ics, chrono_tz::Europe::Kyiv).is_none());
    }
}
