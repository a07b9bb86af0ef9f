//! Collapsing duplicate releases across feeds.
//!
//! The same episode can be published by several Sonarr instances (a 1080p
//! and a 4K instance, for example), each with its own UID. Events are
//! identified by a [`DedupKey`] derived from the normalized title instead.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::event::{Event, SourceType};

/// What distinguishes two releases of the same title.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Discriminator {
    Episode { season: u32, episode: u32 },
    /// Non-numbered identifier (air date, special name), normalized.
    Label(String),
    /// TV entry without any identifier: one per show per day.
    Date(NaiveDate),
    /// Movie release year.
    Year(i32),
}

/// Identity of a logical release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub source_type: SourceType,
    pub title: String,
    pub discriminator: Discriminator,
}

impl DedupKey {
    pub fn for_event(event: &Event) -> Self {
        let discriminator = match event.source_type {
            SourceType::Movie => Discriminator::Year(event.start.year()),
            SourceType::Tv => match (event.season, event.episode, &event.episode_label) {
                (Some(season), Some(episode), _) => Discriminator::Episode { season, episode },
                (_, _, Some(label)) => Discriminator::Label(normalize_title(label)),
                _ => Discriminator::Date(event.local_date()),
            },
        };

        Self {
            source_type: event.source_type,
            title: normalize_title(&event.title),
            discriminator,
        }
    }
}

/// Lowercases and reduces a title to alphanumeric words separated by single spaces.
///
/// `"Marvel's Daredevil: Born Again"` and `"marvels daredevil born again"`
/// differ only in the apostrophe, which is dropped rather than turned into a
/// word break.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;

    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            continue;
        } else {
            pending_space = true;
        }
    }

    out
}

/// Keeps the first event for each [`DedupKey`], preserving input order.
///
/// With `enabled == false` the input is returned untouched.
pub fn deduplicate(events: Vec<Event>, enabled: bool) -> Vec<Event> {
    if !enabled {
        return events;
    }

    let total = events.len();
    let mut seen = HashSet::with_capacity(total);
    let kept: Vec<Event> = events
        .into_iter()
        .filter(|event| {
            let fresh = seen.insert(DedupKey::for_event(event));
            if !fresh {
                debug!(
                    uid = %event.raw_identifier,
                    title = %event.title,
                    "Dropping duplicate release"
                );
            }
            fresh
        })
        .collect();

    if kept.len() < total {
        debug!(
            before = total,
            after = kept.len(),
            "Removed duplicate releases"
        );
    }
    kept
}
