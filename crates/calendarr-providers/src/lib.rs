//! Calendar feed fetching and parsing.
//!
//! - [`HttpFetcher`] / [`DocumentFetcher`] - retrieve feed text
//! - [`parse_ics_document`] - iCalendar text to [`RawEvent`]s
//! - [`expand_recurrences`] - `RRULE` series to one entry per occurrence
//! - [`normalize_event`] - [`RawEvent`] to [`calendarr_core::Event`]
//! - [`load_events`] - all of the above for a set of feeds, failures isolated
//!
//! ```text
//!  Sonarr feed ─┐                        ┌─ parse ─ normalize ─┐
//!               ├─ fetch_all (parallel) ─┤                     ├─ Vec<Event>
//!  Radarr feed ─┘                        └─ parse ─ normalize ─┘
//! ```

pub mod error;
pub mod feed;
pub mod ics;
pub mod normalize;
pub mod raw_event;
pub mod recurrence;
pub mod redact;

pub use error::{FeedError, FeedErrorCode, FeedResult};
pub use feed::{
    BoxFuture, DocumentFetcher, FeedSource, HttpFetcher, LoadedEvents, fetch_all, load_events,
};
pub use ics::{ParsedDocument, parse_ics_document};
pub use normalize::{SummaryParts, normalize_document, normalize_event, split_summary};
pub use raw_event::{RawEvent, RawEventTime};
pub use recurrence::{ExpansionWindow, RecurrenceError, expand_event, expand_recurrences};
pub use redact::redact_url;
