//! Rendering grouped events into chat messages.
//!
//! Each chat platform implements [`PlatformFormatter`], which owns the
//! platform's markup tokens, colour palette, payload limits and JSON payload
//! shapes. [`render_report`] is written once against that trait and turns the
//! days of a run into a header, a subheader and one [`FormattedBlock`] per day.
//!
//! Rules shared by every platform:
//! - movies and all-day entries never show a time
//! - standard `S01E03` / `1x03` identifiers are left unstyled, anything else
//!   (air dates, guest names, specials) is italicised
//! - passed events are shown, hidden or struck through per [`PassedEventPolicy`]

mod discord;
mod slack;


pub use discord::DiscordFormatter;
pub use slack::SlackFormatter;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::{Batch, BatchLimits};
use crate::classify::Classifier;
use crate::dedup::normalize_title;
use crate::event::Event;
use crate::group::Day;
use crate::time::{DateRange, RunContext};

const NO_NEW_RELEASES: &str = "No new releases. Maybe it's a good day to take a walk?";
const EMPTY_DAY: &str = "Nothing scheduled";
const PREMIERE_MARK: &str = "🎉";
const MOVIE_MARK: &str = "🎬";

/// Target chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    Slack,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discord" => Ok(Self::Discord),
            "slack" => Ok(Self::Slack),
            other => Err(format!("unknown platform '{other}' (expected discord or slack)")),
        }
    }
}

/// Clock style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    /// `14:30`
    H24,
    /// `2:30 PM`
    #[default]
    H12,
}

/// How event times are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDisplay {
    pub format: TimeFormat,
    /// Pad the hour to two digits (`09:00`).
    pub leading_zero: bool,
    /// Show times at all.
    pub show_time: bool,
}

impl Default for TimeDisplay {
    fn default() -> Self {
        Self {
            format: TimeFormat::H12,
            leading_zero: true,
            show_time: true,
        }
    }
}

/// What to do with events whose start is already behind "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassedEventPolicy {
    #[default]
    Display,
    Hide,
    Strike,
}

impl FromStr for PassedEventPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DISPLAY" => Ok(Self::Display),
            "HIDE" => Ok(Self::Hide),
            "STRIKE" => Ok(Self::Strike),
            other => Err(format!(
                "invalid passed event handling '{other}' (expected DISPLAY, HIDE or STRIKE)"
            )),
        }
    }
}

/// Platform-independent rendering options.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOptions {
    /// Header text, e.g. `TV Guide`.
    pub header: String,
    /// Append the covered dates to the header.
    pub show_date_range: bool,
    /// Add a line naming the timezone under the subheader.
    pub show_timezone: bool,
    pub time: TimeDisplay,
    pub passed_events: PassedEventPolicy,
    /// Render days that ended up without any line.
    pub show_empty_days: bool,
    /// Text sent after the last batch.
    pub footer: Option<String>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            header: "TV Guide".to_string(),
            show_date_range: true,
            show_timezone: false,
            time: TimeDisplay::default(),
            passed_events: PassedEventPolicy::Display,
            show_empty_days: false,
            footer: None,
        }
    }
}

/// One day's rendered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedBlock {
    /// Day label, empty for single-day reports.
    pub title: String,
    pub body: String,
    /// Weekday index relative to the week start, selects the colour.
    pub position: usize,
    /// Characters counted against payload limits (title + body).
    pub char_len: usize,
    /// Number of event lines in the body.
    pub entry_count: usize,
}

impl FormattedBlock {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        position: usize,
        entry_count: usize,
    ) -> Self {
        let title = title.into();
        let body = body.into();
        let char_len = title.chars().count() + body.chars().count();
        Self {
            title,
            body,
            position,
            char_len,
            entry_count,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.chars().count()
    }
}

/// Everything rendered for one platform, before batching.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedReport {
    pub platform: Platform,
    pub header: String,
    pub subheader: String,
    pub mention: Option<String>,
    pub blocks: Vec<FormattedBlock>,
    pub footer: Option<String>,
}

/// Platform-specific markup and payload shapes.
pub trait PlatformFormatter: Send + Sync {
    fn platform(&self) -> Platform;

    fn bold(&self, text: &str) -> String;

    fn italic(&self, text: &str) -> String;

    fn strike(&self, text: &str) -> String;

    /// Separator between hours and minutes.
    fn time_separator(&self) -> &'static str;

    /// Whitespace after a leading emoji.
    fn emoji_spacing(&self) -> &'static str {
        " "
    }

    /// Header line markup.
    fn header(&self, text: &str) -> String;

    /// Mention prepended to the header message, if configured.
    fn mention(&self) -> Option<String> {
        None
    }

    fn limits(&self) -> BatchLimits;

    /// JSON body of the message carrying header, subheader and mention.
    fn header_payload(&self, report: &FormattedReport) -> Value;

    /// JSON body for one batch of day blocks.
    fn batch_payload(&self, batch: &Batch) -> Value;

    /// JSON body for the footer message.
    fn footer_payload(&self, footer: &str) -> Value;
}

/// Formats a clock time.
///
/// 12-hour clocks map hour 0 to `12 AM` and hour 12 to `12 PM`. Minutes are
/// always two digits.
pub fn format_time(dt: &DateTime<Tz>, display: &TimeDisplay, separator: &str) -> String {
    let (hour, suffix) = match display.format {
        TimeFormat::H24 => (dt.hour(), ""),
        TimeFormat::H12 => match dt.hour() {
            0 => (12, " AM"),
            h @ 1..=11 => (h, " AM"),
            12 => (12, " PM"),
            h => (h - 12, " PM"),
        },
    };

    if display.leading_zero {
        format!("{hour:02}{separator}{:02}{suffix}", dt.minute())
    } else {
        format!("{hour}{separator}{:02}{suffix}", dt.minute())
    }
}

/// True when an event should count as already aired.
///
/// Timed entries have passed once their start is behind `now`. All-day
/// entries pass only when their whole date is before today.
pub fn is_passed(event: &Event, ctx: &RunContext) -> bool {
    if event.is_all_day {
        event.local_date() < ctx.today()
    } else {
        event.start < ctx.now
    }
}

/// Renders one TV line, without passed-event handling.
pub fn tv_line(
    formatter: &dyn PlatformFormatter,
    event: &Event,
    premiere: bool,
    time: &TimeDisplay,
) -> String {
    let mut line = String::new();

    if time.show_time && event.has_display_time() {
        line.push_str(&format_time(&event.start, time, formatter.time_separator()));
        line.push_str(": ");
    }

    line.push_str(&formatter.bold(&event.title));

    if let Some(label) = event.episode_label.as_deref().filter(|l| !l.is_empty()) {
        line.push_str(" - ");
        if event.has_standard_label() {
            line.push_str(label);
        } else {
            line.push_str(&formatter.italic(label));
        }
    }

    if let Some(title) = event.episode_title.as_deref().filter(|t| !t.is_empty()) {
        line.push_str(" - ");
        line.push_str(&formatter.italic(title));
    }

    if premiere {
        line.push_str("  ");
        line.push_str(PREMIERE_MARK);
    }

    line
}

/// Renders one movie line. Movies never carry a time.
pub fn movie_line(formatter: &dyn PlatformFormatter, event: &Event) -> String {
    format!("{MOVIE_MARK}  {}", formatter.bold(&event.title))
}

#[derive(Debug, Default)]
struct Tally {
    episodes: usize,
    movies: usize,
    premieres: HashSet<(String, u32)>,
}

/// Renders all days for one platform.
pub fn render_report(
    formatter: &dyn PlatformFormatter,
    days: &[Day],
    classifier: &Classifier,
    range: &DateRange,
    ctx: &RunContext,
    options: &FormatOptions,
) -> FormattedReport {
    let mut tally = Tally::default();
    let mut blocks = Vec::with_capacity(days.len());

    for day in days {
        let block = render_day(formatter, day, classifier, range, ctx, options, &mut tally);
        if let Some(block) = block {
            blocks.push(block);
        }
    }

    let header_text = if options.show_date_range {
        format!("{} ({range})", options.header)
    } else {
        options.header.clone()
    };

    FormattedReport {
        platform: formatter.platform(),
        header: formatter.header(&header_text),
        subheader: subheader(formatter, &tally, ctx, options),
        mention: formatter.mention(),
        blocks,
        footer: options.footer.clone().filter(|f| !f.trim().is_empty()),
    }
}

fn render_day(
    formatter: &dyn PlatformFormatter,
    day: &Day,
    classifier: &Classifier,
    range: &DateRange,
    ctx: &RunContext,
    options: &FormatOptions,
    tally: &mut Tally,
) -> Option<FormattedBlock> {
    let mut tv_lines = Vec::new();
    let mut movie_lines = Vec::new();

    for event in &day.events {
        let passed = is_passed(event, ctx);
        if passed && options.passed_events == PassedEventPolicy::Hide {
            continue;
        }

        let line = if event.is_movie() {
            tally.movies += 1;
            movie_line(formatter, event)
        } else {
            tally.episodes += 1;
            let premiere = classifier.classify(event).is_premiere();
            if premiere && let Some(season) = event.season {
                tally
                    .premieres
                    .insert((normalize_title(&event.title), season));
            }
            tv_line(formatter, event, premiere, &options.time)
        };

        let line = if passed && options.passed_events == PassedEventPolicy::Strike {
            formatter.strike(&line)
        } else {
            line
        };

        if event.is_movie() {
            movie_lines.push(line);
        } else {
            tv_lines.push(line);
        }
    }

    let entry_count = tv_lines.len() + movie_lines.len();
    let title = if range.is_single_day() {
        String::new()
    } else {
        day.name.clone()
    };

    if entry_count == 0 {
        return options
            .show_empty_days
            .then(|| FormattedBlock::new(title, formatter.italic(EMPTY_DAY), day.position, 0));
    }

    let mut body = tv_lines.join("\n");
    if !movie_lines.is_empty() {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(&formatter.bold("MOVIES"));
        body.push('\n');
        body.push_str(&movie_lines.join("\n"));
    }

    Some(FormattedBlock::new(title, body, day.position, entry_count))
}

fn subheader(
    formatter: &dyn PlatformFormatter,
    tally: &Tally,
    ctx: &RunContext,
    options: &FormatOptions,
) -> String {
    let spacing = formatter.emoji_spacing();
    let plural = |n: usize| if n == 1 { "" } else { "s" };

    let mut parts = Vec::new();
    if tally.episodes > 0 {
        parts.push(format!(
            "📺{spacing}{} all-new episode{}",
            tally.episodes,
            plural(tally.episodes)
        ));
    }
    if tally.movies > 0 {
        parts.push(format!(
            "{MOVIE_MARK}{spacing}{} movie release{}",
            tally.movies,
            plural(tally.movies)
        ));
    }
    let premieres = tally.premieres.len();
    if premieres > 0 {
        parts.push(format!(
            "{PREMIERE_MARK}{spacing}{premieres} season premiere{}",
            plural(premieres)
        ));
    }

    let mut text = if parts.is_empty() {
        NO_NEW_RELEASES.to_string()
    } else {
        formatter.bold(&join_with_and(&parts))
    };

    if options.show_timezone && options.time.show_time {
        text.push('\n');
        text.push_str(&formatter.italic(&format!("Times shown in {}", ctx.timezone.name())));
    }

    text
}

/// Joins `a`, `a and b`, `a, b, and c`.
pub fn join_with_and(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}
