//! Five-field crontab expressions.
//!
//! `minute hour day-of-month month day-of-week`, each field a `*`, a value,
//! a range `a-b`, a step `*/n` or `a-b/n`, or a comma list of those. Months
//! and weekdays also take three-letter names. Day of week runs `0`-`7`
//! with both ends meaning Sunday. When day of month and day of week are
//! both restricted (neither starts with `*`), a date matching either one
//! runs.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::error::ConfigError;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// A parsed crontab line. Each field is a bit set of allowed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    /// Bit 0 is Sunday.
    days_of_week: u64,
    any_day_of_month: bool,
    any_day_of_week: bool,
}

#[derive(Clone, Copy)]
struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// First value `names` maps to.
    names_from: u32,
}

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_from: 0,
};
const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_from: 0,
};
const DAY_OF_MONTH: Field = Field {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
    names_from: 0,
};
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    names_from: 1,
};
const DAY_OF_WEEK: Field = Field {
    name: "day of week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    names_from: 0,
};

impl CronSchedule {
    /// Parses a five-field expression.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCron`] naming the first bad field, or
    /// when the expression can never match (`0 0 31 2 *`).
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        };

        let mut days_of_week = parse_field(dow, DAY_OF_WEEK).map_err(&invalid)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        let schedule = Self {
            minutes: parse_field(minute, MINUTE).map_err(&invalid)?,
            hours: parse_field(hour, HOUR).map_err(&invalid)?,
            days_of_month: parse_field(dom, DAY_OF_MONTH).map_err(&invalid)?,
            months: parse_field(month, MONTH).map_err(&invalid)?,
            days_of_week,
            any_day_of_month: dom.starts_with('*'),
            any_day_of_week: dow.starts_with('*'),
        };

        if schedule.any_day_of_week && !schedule.day_of_month_can_occur() {
            return Err(invalid("day of month never occurs in the given months".to_string()));
        }
        Ok(schedule)
    }

    fn day_of_month_can_occur(&self) -> bool {
        (1..=12u32)
            .filter(|m| has(self.months, *m))
            .any(|m| (1..=days_in_month(m)).any(|d| has(self.days_of_month, d)))
    }

    /// Whether a run is due on `date`.
    pub fn matches_date(&self, date: NaiveDate) -> bool {
        if !has(self.months, date.month()) {
            return false;
        }
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.any_day_of_month || self.any_day_of_week {
            dom && dow
        } else {
            dom || dow
        }
    }

    /// Matching wall-clock times of a day, in order.
    pub fn times(&self) -> impl Iterator<Item = NaiveTime> + '_ {
        (0..24u32)
            .filter(|h| has(self.hours, *h))
            .flat_map(move |h| {
                (0..60u32)
                    .filter(|m| has(self.minutes, *m))
                    .filter_map(move |m| NaiveTime::from_hms_opt(h, m, 0))
            })
    }

    /// Whether `time` is one of [`Self::times`].
    pub fn matches_time(&self, time: NaiveTime) -> bool {
        has(self.hours, time.hour()) && has(self.minutes, time.minute())
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            render_field(self.minutes, 0, 59),
            render_field(self.hours, 0, 23),
            render_field(self.days_of_month, 1, 31),
            render_field(self.months, 1, 12),
            render_field(self.days_of_week, 0, 6),
        )
    }
}

fn has(bits: u64, value: u32) -> bool {
    bits & (1 << value) != 0
}

fn days_in_month(month: u32) -> u32 {
    match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn render_field(bits: u64, min: u32, max: u32) -> String {
    let values: Vec<String> = (min..=max)
        .filter(|v| has(bits, *v))
        .map(|v| v.to_string())
        .collect();
    if values.len() == (max - min + 1) as usize {
        "*".to_string()
    } else {
        values.join(",")
    }
}

fn parse_field(text: &str, field: Field) -> Result<u64, String> {
    let mut bits = 0u64;
    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("bad step '{step}' in {}", field.name))?;
                (range, step)
            }
            None => (item, 1),
        };

        let (low, high) = if range == "*" {
            (field.min, field.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, field)?, parse_value(high, field)?)
        } else {
            let value = parse_value(range, field)?;
            // `5/15` runs from 5 to the end of the field.
            (value, if item.contains('/') { field.max } else { value })
        };
        if low > high {
            return Err(format!("empty range '{range}' in {}", field.name));
        }

        for value in (low..=high).step_by(step as usize) {
            bits |= 1 << value;
        }
    }
    Ok(bits)
}

fn parse_value(text: &str, field: Field) -> Result<u32, String> {
    let value = match text.parse::<u32>() {
        Ok(n) => n,
        Err(_) => field
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(text))
            .map(|i| i as u32 + field.names_from)
            .ok_or_else(|| format!("bad value '{text}' in {}", field.name))?,
    };
    if (field.min..=field.max).contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{value} out of range {}-{} in {}",
            field.min, field.max, field.name
        ))
    }
}
