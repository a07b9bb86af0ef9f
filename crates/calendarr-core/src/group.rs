//! Bucketing events into calendar days.
//!
//! Ordering inside a day is fixed: TV entries come before movies; within
//! each kind, all-day entries come first, then timed entries by start
//! instant. Remaining ties are broken by title and finally by input order.

use std::cmp::Ordering;

use chrono::NaiveDate;
use tracing::debug;

use crate::event::Event;
use crate::time::{DateRange, WeekStart};

/// One calendar date and the events starting on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Day {
    /// Weekday label, e.g. `Monday, Mar 10`.
    pub name: String,
    pub date: NaiveDate,
    /// Index of the weekday relative to the configured week start (0-6).
    pub position: usize,
    pub events: Vec<Event>,
}

impl Day {
    fn new(date: NaiveDate, week_start: WeekStart) -> Self {
        Self {
            name: date.format("%A, %b %d").to_string(),
            date,
            position: week_start.position(date),
            events: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn tv_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_tv())
    }

    pub fn movie_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_movie())
    }
}

/// Orders two events that start on the same day.
pub fn day_order(a: &Event, b: &Event) -> Ordering {
    a.source_type
        .cmp(&b.source_type)
        .then_with(|| b.is_all_day.cmp(&a.is_all_day))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.title.cmp(&b.title))
}

/// Assigns each event to the local date of its start and returns the days of
/// `range` in date order.
///
/// Event starts are expected to already be in the run's timezone. Events
/// outside the range are dropped. Days without events are kept only when
/// `show_empty` is set.
pub fn group_by_day(
    events: Vec<Event>,
    range: &DateRange,
    week_start: WeekStart,
    show_empty: bool,
) -> Vec<Day> {
    let mut days: Vec<Day> = range.days().map(|d| Day::new(d, week_start)).collect();

    for event in events {
        let date = event.local_date();
        if !range.contains(date) {
            debug!(
                uid = %event.raw_identifier,
                title = %event.title,
                %date,
                "Event outside reporting range"
            );
            continue;
        }
        let index = (date - range.start).num_days() as usize;
        days[index].events.push(event);
    }

    for day in &mut days {
        // Stable, so equal keys keep feed order.
        day.events.sort_by(day_order);
    }

    if !show_empty {
        days.retain(|day| !day.is_empty());
    }
    days
}
