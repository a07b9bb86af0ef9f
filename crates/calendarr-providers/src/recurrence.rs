//! Recurring calendar entries.
//!
//! Sonarr and Radarr publish one entry per release, but a shared or
//! hand-made calendar can carry `RRULE` series. A series is expanded into
//! one entry per occurrence inside the reporting window, so a weekly show
//! that started months ago still appears this week.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use rrule::{RRule, Unvalidated};
use tracing::{debug, warn};

use calendarr_core::local_midnight;

use crate::raw_event::{RawEvent, RawEventTime};

/// Occurrences generated per series at most.
const MAX_OCCURRENCES: u16 = 500;

#[derive(Debug, thiserror::Error)]
pub enum RecurrenceError {
    #[error("invalid RRULE: {0}")]
    InvalidRule(String),
}

/// Span recurring entries are expanded over. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExpansionWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// From local midnight of `first` to local midnight of `end` in `tz`.
    pub fn for_dates(tz: Tz, first: NaiveDate, end: NaiveDate) -> Self {
        Self::new(
            local_midnight(&tz, first).with_timezone(&Utc),
            local_midnight(&tz, end).with_timezone(&Utc),
        )
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Replaces every recurring entry with its occurrences inside `window`.
///
/// Entries without a rule pass through untouched. A series whose rule
/// cannot be read keeps its first occurrence only.
pub fn expand_recurrences(
    events: Vec<RawEvent>,
    tz: Tz,
    window: &ExpansionWindow,
) -> Vec<RawEvent> {
    let mut expanded = Vec::with_capacity(events.len());
    for raw in events {
        if !raw.is_recurring() {
            expanded.push(raw);
            continue;
        }
        match expand_event(&raw, tz, window) {
            Ok(occurrences) => {
                debug!(uid = %raw.uid, occurrences = occurrences.len(), "Expanded recurring entry");
                expanded.extend(occurrences);
            }
            Err(err) => {
                warn!(uid = %raw.uid, "Using first occurrence only: {err}");
                expanded.push(RawEvent {
                    rrule: None,
                    exdates: Vec::new(),
                    ..raw
                });
            }
        }
    }
    expanded
}

/// Occurrences of one series that start inside `window`, in order.
///
/// # Errors
///
/// Returns [`RecurrenceError::InvalidRule`] when the `RRULE` value cannot
/// be parsed or does not fit the entry's `DTSTART`.
pub fn expand_event(
    raw: &RawEvent,
    tz: Tz,
    window: &ExpansionWindow,
) -> Result<Vec<RawEvent>, RecurrenceError> {
    let Some(rule) = raw.rrule.as_deref() else {
        return Ok(vec![raw.clone()]);
    };

    let zone = rule_zone(&raw.start, tz);
    let first = raw.start.resolve(tz);
    let mut set = rule
        .parse::<RRule<Unvalidated>>()
        .and_then(|rule| rule.build(first.with_timezone(&zone)))
        .map_err(|e| RecurrenceError::InvalidRule(e.to_string()))?;
    for exdate in &raw.exdates {
        set = set.exdate(exdate.resolve(tz).with_timezone(&zone));
    }

    let result = set
        .after((window.start - TimeDelta::seconds(1)).with_timezone(&zone))
        .before(window.end.with_timezone(&zone))
        .all(MAX_OCCURRENCES);
    if result.limited {
        warn!(uid = %raw.uid, limit = MAX_OCCURRENCES, "Recurring entry truncated");
    }

    let duration = raw.end.as_ref().map(|end| end.resolve(tz) - first);
    Ok(result
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|at| window.contains(*at))
        .map(|at| occurrence(raw, at, duration, tz))
        .collect())
}

/// The zone a series repeats in, so wall-clock times survive DST changes.
fn rule_zone(start: &RawEventTime, tz: Tz) -> rrule::Tz {
    match start {
        RawEventTime::Utc(_) => rrule::Tz::Tz(chrono_tz::UTC),
        RawEventTime::Zoned(dt) => rrule::Tz::Tz(dt.timezone()),
        RawEventTime::Floating(_) | RawEventTime::Date(_) => rrule::Tz::Tz(tz),
    }
}

fn occurrence(
    raw: &RawEvent,
    at: DateTime<Utc>,
    duration: Option<TimeDelta>,
    tz: Tz,
) -> RawEvent {
    let local_day = at.with_timezone(&tz).format("%Y%m%d");
    RawEvent {
        uid: format!("{}@{local_day}", raw.uid),
        start: same_kind(&raw.start, at, tz),
        end: raw
            .end
            .as_ref()
            .zip(duration)
            .map(|(end, duration)| same_kind(end, at + duration, tz)),
        rrule: None,
        exdates: Vec::new(),
        ..raw.clone()
    }
}

/// `at` expressed the way `template` was published.
fn same_kind(template: &RawEventTime, at: DateTime<Utc>, tz: Tz) -> RawEventTime {
    match template {
        RawEventTime::Utc(_) => RawEventTime::Utc(at),
        RawEventTime::Zoned(dt) => RawEventTime::Zoned(at.with_timezone(&dt.timezone())),
        RawEventTime::Floating(_) => RawEventTime::Floating(at.with_timezone(&tz).naive_local()),
        RawEventTime::Date(_) => RawEventTime::Date(at.with_timezone(&tz).date_naive()),
    }
}
