//! iCalendar document parsing.
//!
//! Turns the text of a Sonarr/Radarr feed into [`RawEvent`]s. Entries that
//! cannot be placed in time (no `DTSTART`) are skipped and counted; the
//! document as a whole fails only when it is not a calendar at all.

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
};
use tracing::{debug, trace, warn};

use crate::error::{FeedError, FeedResult};
use crate::raw_event::{RawEvent, RawEventTime};

/// Events found in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub events: Vec<RawEvent>,
    /// Entries dropped because they were malformed.
    pub skipped: usize,
}

/// Parses a feed body.
///
/// `feed` identifies the document in logs and must already be redacted.
///
/// # Errors
///
/// Returns an `InvalidDocument` error when the text is not an iCalendar
/// document.
pub fn parse_ics_document(text: &str, feed: &str) -> FeedResult<ParsedDocument> {
    if !text.contains("BEGIN:VCALENDAR") {
        return Err(FeedError::invalid_document("no VCALENDAR found in response").with_feed(feed));
    }

    let calendar = text.parse::<Calendar>().map_err(|e| {
        FeedError::invalid_document(format!("unparseable calendar: {e}")).with_feed(feed)
    })?;

    let mut parsed = ParsedDocument::default();
    let entries = calendar.iter().filter_map(|component| match component {
        CalendarComponent::Event(event) => Some(event),
        _ => None,
    });

    for (index, event) in entries.enumerate() {
        match parse_event(event, index) {
            Some(raw) => parsed.events.push(raw),
            None => {
                parsed.skipped += 1;
                warn!(
                    feed,
                    uid = ?event.get_uid(),
                    summary = ?event.get_summary(),
                    "Skipping calendar entry without a start time"
                );
            }
        }
    }

    debug!(
        feed,
        events = parsed.events.len(),
        skipped = parsed.skipped,
        "Parsed calendar document"
    );
    Ok(parsed)
}

fn parse_event(event: &Event, index: usize) -> Option<RawEvent> {
    let start = convert_date_time(event.get_start()?);

    let uid = event
        .get_uid()
        .map(str::to_string)
        .unwrap_or_else(|| format!("entry-{index}"));

    let mut raw = RawEvent::new(uid, start);

    if let Some(end) = event.get_end() {
        raw = raw.with_end(convert_date_time(end));
    }
    if let Some(summary) = event.get_summary() {
        raw = raw.with_summary(summary);
    }
    if let Some(description) = event.get_description() {
        raw = raw.with_description(description);
    }
    if let Some(status) = event.get_status() {
        raw = raw.with_status(format!("{status:?}"));
    }
    if let Some(rule) = event.property_value("RRULE") {
        raw = raw.with_rrule(rule.trim());
        for value in event.property_value("EXDATE").unwrap_or_default().split(',') {
            match parse_exdate(value.trim(), &raw.start) {
                Some(exdate) => raw = raw.with_exdate(exdate),
                None if value.trim().is_empty() => {}
                None => debug!(uid = %raw.uid, value, "Ignoring unreadable EXDATE"),
            }
        }
    }

    trace!(uid = %raw.uid, summary = ?raw.summary, start = ?raw.start, "Parsed calendar entry");
    Some(raw)
}

/// Reads one `EXDATE` value. Local times take the zone of `start`.
fn parse_exdate(value: &str, start: &RawEventTime) -> Option<RawEventTime> {
    if value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(RawEventTime::Date);
    }
    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some(RawEventTime::Utc(Utc.from_utc_datetime(&naive)));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    Some(match start {
        RawEventTime::Zoned(dt) => convert_date_time(DatePerhapsTime::DateTime(
            CalendarDateTime::WithTimezone {
                date_time: naive,
                tzid: dt.timezone().name().to_string(),
            },
        )),
        _ => RawEventTime::Floating(naive),
    })
}

fn convert_date_time(value: DatePerhapsTime) -> RawEventTime {
    match value {
        DatePerhapsTime::Date(date) => RawEventTime::Date(date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => RawEventTime::Utc(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            RawEventTime::Floating(naive)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            match tzid.parse::<Tz>() {
                Ok(tz) => match tz.from_local_datetime(&date_time).earliest() {
                    Some(dt) => RawEventTime::Zoned(dt),
                    // Nonexistent local time (DST gap).
                    None => RawEventTime::Zoned(tz.from_utc_datetime(&date_time)),
                },
                Err(_) => {
                    warn!(%tzid, "Unknown timezone in calendar entry, assuming UTC");
                    RawEventTime::Utc(Utc.from_utc_datetime(&date_time))
                }
            }
        }
    }
}
