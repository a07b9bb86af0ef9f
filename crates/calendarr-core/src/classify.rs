//! Premiere detection.
//!
//! Classification needs the whole run in view, so it happens in two passes:
//! [`Classifier::new`] indexes every episode per show, then
//! [`Classifier::classify`] decides per event.
//!
//! Only explicit numbering counts. Episode 1 of a season is a premiere;
//! nothing is inferred from a show's lowest episode when that episode is not
//! the first one, and finales are never flagged since feeds do not say how
//! long a season is.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::dedup::normalize_title;
use crate::event::Event;
use crate::group::Day;

/// Decoration-relevant category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Regular,
    /// Season 1, episode 1.
    SeriesPremiere,
    /// Episode 1 of a later season.
    SeasonPremiere,
    /// Episode identified by its air date (talk shows, news).
    Daily,
}

impl Classification {
    pub fn is_premiere(&self) -> bool {
        matches!(self, Self::SeriesPremiere | Self::SeasonPremiere)
    }
}

#[derive(Debug, Default)]
struct ShowEpisodes {
    /// season -> episodes present in this run
    seasons: BTreeMap<u32, BTreeSet<u32>>,
}

impl ShowEpisodes {
    fn lowest_episode(&self, season: u32) -> Option<u32> {
        self.seasons
            .get(&season)
            .and_then(|eps| eps.first().copied())
    }
}

/// Run-wide episode index used to classify events.
#[derive(Debug, Default)]
pub struct Classifier {
    shows: HashMap<String, ShowEpisodes>,
}

impl Classifier {
    /// First pass: collect every numbered TV episode in the run.
    pub fn new(days: &[Day]) -> Self {
        let mut shows: HashMap<String, ShowEpisodes> = HashMap::new();

        for event in days.iter().flat_map(|d| d.events.iter()) {
            if let (true, Some(season), Some(episode)) = (event.is_tv(), event.season, event.episode)
            {
                shows
                    .entry(normalize_title(&event.title))
                    .or_default()
                    .seasons
                    .entry(season)
                    .or_default()
                    .insert(episode);
            }
        }

        Self { shows }
    }

    /// Second pass: classify one event.
    pub fn classify(&self, event: &Event) -> Classification {
        if event.is_movie() {
            return Classification::Regular;
        }

        if let (Some(season), Some(episode)) = (event.season, event.episode) {
            let opens_season = episode == 1
                && season > 0
                && self
                    .shows
                    .get(&normalize_title(&event.title))
                    .and_then(|show| show.lowest_episode(season))
                    == Some(1);

            return match (opens_season, season) {
                (true, 1) => Classification::SeriesPremiere,
                (true, _) => Classification::SeasonPremiere,
                (false, _) => Classification::Regular,
            };
        }

        match event.episode_label.as_deref() {
            Some(label) if is_air_date(label) => Classification::Daily,
            _ => Classification::Regular,
        }
    }

    /// Number of distinct show seasons that premiere in the run.
    pub fn premiere_count(&self) -> usize {
        self.shows
            .values()
            .flat_map(|show| show.seasons.iter())
            .filter(|(season, eps)| **season > 0 && eps.contains(&1))
            .count()
    }
}

/// True for `YYYY-MM-DD` identifiers.
fn is_air_date(label: &str) -> bool {
    chrono::NaiveDate::parse_from_str(label.trim(), "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::group_by_day;
    use crate::time::{DateRange, WeekStart};
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;

    fn ep(show: &str, season: u32, episode: u32) -> Event {
        Event::tv(
            format!("{show}-{season}-{episode}"),
            show,
            Tz::UTC.with_ymd_and_hms(2025, 3, 11, 21, 0, 0).unwrap(),
        )
        .with_episode(season, episode, format!("S{season:02}E{episode:02}"))
    }

    fn days(events: Vec<Event>) -> Vec<Day> {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
        );
        group_by_day(events, &range, WeekStart::Monday, false)
    }

    #[test]
    fn premieres() {
        let events = vec![ep("Andor", 2, 1), ep("Andor", 2, 2), ep("Paradise", 1, 1)];
        let classifier = Classifier::new(&days(events.clone()));

        assert_eq!(
            classifier.classify(&events[0]),
            Classification::SeasonPremiere
        );
        assert_eq!(classifier.classify(&events[1]), Classification::Regular);
        assert_eq!(
            classifier.classify(&events[2]),
            Classification::SeriesPremiere
        );
        assert_eq!(classifier.premiere_count(), 2);
    }

    #[test]
    fn lowest_episode_alone_is_not_a_premiere() {
        let events = vec![ep("Show", 3, 5), ep("Show", 3, 6)];
        let classifier = Classifier::new(&days(events.clone()));
        assert_eq!(classifier.classify(&events[0]), Classification::Regular);
        assert_eq!(classifier.premiere_count(), 0);
    }

    #[test]
    fn specials_are_never_premieres() {
        let events = vec![ep("Doctor Who", 0, 1)];
        let classifier = Classifier::new(&days(events.clone()));
        assert_eq!(classifier.classify(&events[0]), Classification::Regular);
        assert_eq!(classifier.premiere_count(), 0);
    }

    #[test]
    fn duplicate_premieres_counted_once() {
        let events = vec![ep("Show X", 2, 1), ep("show x", 2, 1)];
        let classifier = Classifier::new(&days(events.clone()));
        assert!(classifier.classify(&events[1]).is_premiere());
        assert_eq!(classifier.premiere_count(), 1);
    }

    #[test]
    fn daily_and_unnumbered() {
        let start = Tz::UTC.with_ymd_and_hms(2025, 3, 11, 23, 0, 0).unwrap();
        let daily = Event::tv("d", "Late Show", start).with_episode_label("2025-03-11");
        let special = Event::tv("s", "Concert", start).with_episode_label("Live from Berlin");
        let movie = Event::movie("m", "Dune", start);

        let classifier = Classifier::new(&days(vec![daily.clone(), special.clone()]));
        assert_eq!(classifier.classify(&daily), Classification::Daily);
        assert_eq!(classifier.classify(&special), Classification::Regular);
        assert_eq!(classifier.classify(&movie), Classification::Regular);
    }

    #[test]
    fn event_outside_indexed_run_is_regular() {
        let classifier = Classifier::new(&[]);
        assert_eq!(classifier.classify(&ep("Show", 2, 1)), Classification::Regular);
    }
}
