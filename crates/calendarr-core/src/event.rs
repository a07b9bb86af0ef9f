//! Release events produced from calendar feeds.
//!
//! An [`Event`] is one TV episode airing or one movie release, already
//! converted into the run's timezone. Events are built once by the parser
//! and treated as immutable values afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// The kind of feed an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Episode airings (Sonarr).
    Tv,
    /// Movie releases (Radarr).
    Movie,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tv => "tv",
            Self::Movie => "movie",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tv" | "sonarr" => Ok(Self::Tv),
            "movie" | "movies" | "radarr" => Ok(Self::Movie),
            other => Err(format!("unknown feed type '{other}' (expected tv or movie)")),
        }
    }
}

/// A single release on the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Show name for TV, movie title for movies.
    pub title: String,
    /// The calendar entry summary as published by the feed.
    pub summary: String,
    /// Start instant in the run's timezone. All-day entries start at local midnight.
    pub start: DateTime<Tz>,
    /// Optional end instant.
    pub end: Option<DateTime<Tz>>,
    pub source_type: SourceType,
    /// True when no meaningful time of day exists. Always true for movies.
    pub is_all_day: bool,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Identifier token as published, e.g. `S01E03`, `1x03` or `2024-05-01`.
    pub episode_label: Option<String>,
    pub episode_title: Option<String>,
    /// Feed-provided UID, used in logs.
    pub raw_identifier: String,
}

impl Event {
    /// Creates a TV event with no episode information.
    pub fn tv(
        raw_identifier: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Tz>,
    ) -> Self {
        let title = title.into();
        Self {
            summary: title.clone(),
            title,
            start,
            end: None,
            source_type: SourceType::Tv,
            is_all_day: false,
            season: None,
            episode: None,
            episode_label: None,
            episode_title: None,
            raw_identifier: raw_identifier.into(),
        }
    }

    /// Creates a movie event. Movies are always all-day.
    pub fn movie(
        raw_identifier: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Tz>,
    ) -> Self {
        Self {
            source_type: SourceType::Movie,
            is_all_day: true,
            ..Self::tv(raw_identifier, title, start)
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_end(mut self, end: DateTime<Tz>) -> Self {
        self.end = Some(end);
        self
    }

    /// Marks the event all-day. Ignored for movies, which are always all-day.
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.is_all_day = all_day || self.is_movie();
        self
    }

    /// Sets season and episode numbers together with their display label.
    pub fn with_episode(mut self, season: u32, episode: u32, label: impl Into<String>) -> Self {
        self.season = Some(season);
        self.episode = Some(episode);
        self.episode_label = Some(label.into());
        self
    }

    /// Sets a non-numbered identifier such as an air date or a special's name.
    pub fn with_episode_label(mut self, label: impl Into<String>) -> Self {
        self.episode_label = Some(label.into());
        self
    }

    pub fn with_episode_title(mut self, title: impl Into<String>) -> Self {
        self.episode_title = Some(title.into());
        self
    }

    pub fn is_movie(&self) -> bool {
        self.source_type == SourceType::Movie
    }

    pub fn is_tv(&self) -> bool {
        self.source_type == SourceType::Tv
    }

    /// True when the event has a time of day worth displaying.
    pub fn has_display_time(&self) -> bool {
        !self.is_all_day && !self.is_movie()
    }

    /// Local calendar date of the start instant.
    pub fn local_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// True when the label is a standard `SxxEyy` or `NxNN` marker.
    pub fn has_standard_label(&self) -> bool {
        self.episode_label
            .as_deref()
            .is_some_and(is_standard_episode_label)
    }
}

/// Returns true for `S01E03`-style (any case) and `1x03`-style markers.
///
/// Multi-episode markers (`S01E01E02`, `S01E01-E02`) count as standard.
pub fn is_standard_episode_label(label: &str) -> bool {
    let lower = label.trim().to_ascii_lowercase();
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if let Some(rest) = lower.strip_prefix('s') {
        let mut parts = rest.split('e');
        let season_ok = parts.next().is_some_and(digits);
        let episodes: Vec<&str> = parts.map(|p| p.strip_suffix('-').unwrap_or(p)).collect();
        return season_ok && !episodes.is_empty() && episodes.into_iter().all(digits);
    }
    match lower.split_once('x') {
        Some((season, episode)) => digits(season) && digits(episode),
        None => false,
    }
}
