//! RawEvent to Event conversion.
//!
//! Sonarr publishes summaries as `Show - 1x03 - Episode Title` (or with
//! `S01E03` markers, depending on version and settings). The summary is split
//! on ` - ` into show name, identifier and episode title; the identifier is
//! parsed into season and episode numbers when it is a standard marker and
//! kept as a free-text label otherwise (air dates for daily shows, special
//! names). Radarr entries become all-day movie events.

use std::sync::LazyLock;

use chrono_tz::Tz;
use regex::Regex;
use tracing::debug;

use calendarr_core::{Event, SourceType};

use crate::ics::ParsedDocument;
use crate::raw_event::RawEvent;

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+-\s+").expect("Invalid separator regex"));

/// `S01E03`, `s1e3`, also matches the first part of `S01E01E02`.
static SXXEYY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bs(\d{1,4})e(\d{1,4})").expect("Invalid SxxEyy regex")
});

/// `1x03`.
static NXNN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,4})x(\d{1,4})\b").expect("Invalid NxNN regex"));

/// The pieces of a TV summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryParts {
    pub show: String,
    pub label: Option<String>,
    pub season_episode: Option<(u32, u32)>,
    pub episode_title: Option<String>,
}

/// Season and episode from a marker at the start of `text`.
pub fn parse_episode_marker(text: &str) -> Option<(u32, u32)> {
    let text = text.trim();
    [&*SXXEYY, &*NXNN].into_iter().find_map(|re| {
        let caps = re.captures(text)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    })
}

/// Splits a TV summary into show, identifier and episode title.
pub fn split_summary(summary: &str) -> SummaryParts {
    let summary = summary.trim();
    let parts: Vec<&str> = SEPARATOR.splitn(summary, 3).map(str::trim).collect();

    if let [show, ident, rest @ ..] = parts.as_slice() {
        let episode_title = rest
            .first()
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string());
        return SummaryParts {
            show: show.to_string(),
            label: (!ident.is_empty()).then(|| ident.to_string()),
            season_episode: parse_episode_marker(ident),
            episode_title,
        };
    }

    // No separators: look for a marker anywhere, e.g. `Show S01E03`.
    let found = [&*SXXEYY, &*NXNN].into_iter().find_map(|re| re.find(summary));
    if let Some(marker) = found
        && marker.start() > 0
    {
        let show = summary[..marker.start()].trim_end_matches([' ', '-', ':']).trim();
        let tail = summary[marker.end()..].trim_start_matches([' ', '-', ':']).trim();
        return SummaryParts {
            show: show.to_string(),
            label: Some(marker.as_str().to_string()),
            season_episode: parse_episode_marker(marker.as_str()),
            episode_title: (!tail.is_empty()).then(|| tail.to_string()),
        };
    }

    SummaryParts {
        show: summary.to_string(),
        label: None,
        season_episode: None,
        episode_title: None,
    }
}

/// Converts a raw entry into an [`Event`] in `tz`.
pub fn normalize_event(raw: &RawEvent, source_type: SourceType, tz: Tz) -> Event {
    let start = raw.start.resolve(tz);
    let summary = raw.effective_summary();

    let mut event = match source_type {
        SourceType::Movie => Event::movie(&raw.uid, summary, start),
        SourceType::Tv => {
            let parts = split_summary(summary);
            let mut event = Event::tv(&raw.uid, parts.show, start)
                .with_summary(summary)
                .with_all_day(raw.start.is_all_day());
            event = match (parts.season_episode, parts.label) {
                (Some((season, episode)), Some(label)) => event.with_episode(season, episode, label),
                (_, Some(label)) => event.with_episode_label(label),
                _ => event,
            };
            if let Some(title) = parts.episode_title {
                event = event.with_episode_title(title);
            }
            event
        }
    };

    if let Some(end) = &raw.end {
        event = event.with_end(end.resolve(tz));
    }
    event
}

/// Converts every usable entry of a document. Cancelled entries are dropped.
pub fn normalize_document(doc: &ParsedDocument, source_type: SourceType, tz: Tz) -> Vec<Event> {
    doc.events
        .iter()
        .filter(|raw| {
            if raw.is_cancelled() {
                debug!(uid = %raw.uid, "Ignoring cancelled entry");
                return false;
            }
            true
        })
        .map(|raw| normalize_event(raw, source_type, tz))
        .collect()
}
