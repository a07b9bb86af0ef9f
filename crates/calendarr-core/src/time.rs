//! Run context and date ranges.
//!
//! [`RunContext`] carries the two values every stage needs: the instant the
//! run started and the configured timezone. [`DateRange`] is the half-open
//! span of local dates a report covers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// "Now" and the timezone for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

impl RunContext {
    pub fn new(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self { now, timezone }
    }

    /// Current instant in the configured timezone.
    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.timezone)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    /// Local midnight at the start of `date`.
    ///
    /// When midnight does not exist (DST gap) the first valid instant of the
    /// day is used.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Tz> {
        local_midnight(&self.timezone, date)
    }
}

/// Resolves local midnight on `date` in `tz`, tolerating DST transitions.
pub fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(earliest, _) => earliest,
        chrono::LocalResult::None => {
            // A gap at midnight is at most a couple of hours wide.
            (1..=3)
                .filter_map(|h| {
                    tz.from_local_datetime(&(midnight + chrono::Duration::hours(h)))
                        .earliest()
                })
                .next()
                .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
        }
    }
}

/// First day of the week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl WeekStart {
    pub fn weekday(&self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Sunday => Weekday::Sun,
        }
    }

    /// Zero-based position of `date` within a week starting on this day.
    pub fn position(&self, date: NaiveDate) -> usize {
        match self {
            Self::Monday => date.weekday().num_days_from_monday() as usize,
            Self::Sunday => date.weekday().num_days_from_sunday() as usize,
        }
    }
}

/// How often reports are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Daily,
    #[default]
    Weekly,
}

impl FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            other => Err(format!("invalid schedule type '{other}' (expected DAILY or WEEKLY)")),
        }
    }
}

/// How many days a report covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarRange {
    Day,
    Week,
    /// `Day` for daily schedules, `Week` for weekly ones.
    #[default]
    Auto,
}

impl CalendarRange {
    /// Resolves `Auto` against the schedule type.
    pub fn resolve(self, schedule: ScheduleType) -> Self {
        match (self, schedule) {
            (Self::Auto, ScheduleType::Daily) => Self::Day,
            (Self::Auto, ScheduleType::Weekly) => Self::Week,
            (range, _) => range,
        }
    }
}

impl FromStr for CalendarRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAY" => Ok(Self::Day),
            "WEEK" => Ok(Self::Week),
            "AUTO" => Ok(Self::Auto),
            other => Err(format!("invalid calendar range '{other}' (expected DAY, WEEK or AUTO)")),
        }
    }
}

/// A half-open span of local dates `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range. `end` is clamped so the range is never negative.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// The range a run reports on.
    ///
    /// `Day` covers today; `Week` covers the week containing today, starting
    /// on `week_start`. `Auto` must be resolved by the caller and is treated
    /// as `Week` here.
    pub fn for_run(range: CalendarRange, week_start: WeekStart, ctx: &RunContext) -> Self {
        let today = ctx.today();
        match range {
            CalendarRange::Day => Self::new(today, today + Days::new(1)),
            CalendarRange::Week | CalendarRange::Auto => {
                let offset = week_start.position(today) as u64;
                let start = today - Days::new(offset);
                Self::new(start, start + Days::new(7))
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days().max(0) as usize
    }

    pub fn is_single_day(&self) -> bool {
        self.num_days() == 1
    }

    /// Last date inside the range.
    pub fn last_day(&self) -> NaiveDate {
        self.end.pred_opt().unwrap_or(self.start).max(self.start)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take(self.num_days())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start.format("%A, %b %d"))
        } else {
            write!(
                f,
                "{} - {}",
                self.start.format("%b %d"),
                self.last_day().format("%b %d")
            )
        }
    }
}
