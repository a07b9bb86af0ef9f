//! When reports are sent.
//!
//! A [`Schedule`] is a local wall-clock time, every day or on one weekday,
//! or a crontab expression, in the configured timezone. Local times that
//! do not exist (spring-forward gap) move forward one hour; ambiguous ones
//! (fall-back overlap) take the earlier instant.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::cron::CronSchedule;
use crate::error::ConfigError;

/// Recurring run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { time: NaiveTime },
    Weekly { weekday: Weekday, time: NaiveTime },
    Cron(CronSchedule),
}

/// Days searched for the next cron match; a leap day can be four years out.
const CRON_HORIZON_DAYS: i64 = 366 * 4 + 1;

impl Schedule {
    fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Self::Daily { .. } => true,
            Self::Weekly { weekday, .. } => date.weekday() == *weekday,
            Self::Cron(cron) => cron.matches_date(date),
        }
    }

    fn times(&self) -> Vec<NaiveTime> {
        match self {
            Self::Daily { time } | Self::Weekly { time, .. } => vec![*time],
            Self::Cron(cron) => cron.times().collect(),
        }
    }

    /// The first scheduled instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let today = now.with_timezone(&tz).date_naive();
        let horizon = match self {
            Self::Cron(_) => CRON_HORIZON_DAYS,
            _ => 8,
        };
        let times = self.times();
        (0..=horizon)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter(|date| self.matches(*date))
            .flat_map(|date| times.iter().map(move |time| resolve_local(tz, date, *time)))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| now + Duration::days(7))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily { time } => write!(f, "daily at {}", time.format("%H:%M")),
            Self::Weekly { weekday, time } => {
                write!(f, "every {weekday} at {}", time.format("%H:%M"))
            }
            Self::Cron(cron) => write!(f, "cron '{cron}'"),
        }
    }
}

fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let local = date.and_time(time);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = local + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&local))
        }
    }
}

/// Parses `HH:MM` (24-hour).
pub fn parse_run_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::InvalidRunTime(value.to_string()))
}

/// Parses a weekday given as a cron-style number (`0`/`7` Sunday, `1`
/// Monday, ...) or an English name (`mon`, `Monday`).
pub fn parse_schedule_day(value: &str) -> Result<Weekday, ConfigError> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u8>() {
        return match n {
            0 | 7 => Ok(Weekday::Sun),
            // chrono numbers weekdays from Monday = 0.
            1..=6 => Weekday::try_from(n - 1)
                .map_err(|_| ConfigError::InvalidScheduleDay(value.to_string())),
            _ => Err(ConfigError::InvalidScheduleDay(value.to_string())),
        };
    }
    value
        .parse::<Weekday>()
        .map_err(|_| ConfigError::InvalidScheduleDay(value.to_string()))
}
