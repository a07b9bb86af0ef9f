//! Calendar entries as found in a feed, before normalization.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use calendarr_core::local_midnight;

/// A `DTSTART`/`DTEND` value as published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEventTime {
    /// `...Z` values.
    Utc(DateTime<Utc>),
    /// `TZID=` values with a zone chrono-tz knows.
    Zoned(DateTime<Tz>),
    /// Values without any zone, local to the reader.
    Floating(NaiveDateTime),
    /// `VALUE=DATE` values.
    Date(NaiveDate),
}

impl RawEventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Resolves the value into `tz`.
    ///
    /// Floating times are read as wall-clock times in `tz`; dates become
    /// local midnight.
    pub fn resolve(&self, tz: Tz) -> DateTime<Tz> {
        match self {
            Self::Utc(dt) => dt.with_timezone(&tz),
            Self::Zoned(dt) => dt.with_timezone(&tz),
            Self::Floating(naive) => tz
                .from_local_datetime(naive)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(naive)),
            Self::Date(date) => local_midnight(&tz, *date),
        }
    }
}

/// One `VEVENT` from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// `UID`, or a synthesized identifier when the entry has none.
    pub uid: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: RawEventTime,
    pub end: Option<RawEventTime>,
    pub status: Option<String>,
    /// `RRULE` value, when the entry repeats.
    pub rrule: Option<String>,
    /// `EXDATE` values removed from the recurrence.
    pub exdates: Vec<RawEventTime>,
}

impl RawEvent {
    pub fn new(uid: impl Into<String>, start: RawEventTime) -> Self {
        Self {
            uid: uid.into(),
            summary: None,
            description: None,
            start,
            end: None,
            status: None,
            rrule: None,
            exdates: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_end(mut self, end: RawEventTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_rrule(mut self, rule: impl Into<String>) -> Self {
        self.rrule = Some(rule.into());
        self
    }

    pub fn with_exdate(mut self, exdate: RawEventTime) -> Self {
        self.exdates.push(exdate);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }

    /// Trimmed summary, or `"(No title)"`.
    pub fn effective_summary(&self) -> &str {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("(No title)")
    }

    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("cancelled"))
    }
}
