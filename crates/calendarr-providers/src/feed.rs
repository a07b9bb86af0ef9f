//! Feed fetching.
//!
//! A [`DocumentFetcher`] turns a [`FeedSource`] into the text of an iCalendar
//! document. [`HttpFetcher`] is the real implementation; tests substitute
//! their own. [`load_events`] fetches every configured feed concurrently,
//! parses and normalizes the successful ones and reports the failures
//! without aborting the run.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono_tz::Tz;
use futures_util::future::join_all;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use calendarr_core::{Event, SourceType};

use crate::error::{FeedError, FeedResult};
use crate::ics::parse_ics_document;
use crate::normalize::normalize_document;
use crate::recurrence::{ExpansionWindow, expand_recurrences};
use crate::redact::redact_url;

/// Boxed future returned by fetchers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A calendar URL and the kind of releases it publishes.
#[derive(Clone, PartialEq, Eq)]
pub struct FeedSource {
    url: String,
    source_type: SourceType,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            url: url.into(),
            source_type,
        }
    }

    pub fn tv(url: impl Into<String>) -> Self {
        Self::new(url, SourceType::Tv)
    }

    pub fn movie(url: impl Into<String>) -> Self {
        Self::new(url, SourceType::Movie)
    }

    /// The full URL, API key included. Do not log it.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// The URL with credentials and query removed, safe for logs.
    pub fn redacted(&self) -> String {
        redact_url(&self.url)
    }

    /// Checks that the URL is an absolute http(s) URL.
    pub fn validate(&self) -> FeedResult<()> {
        let url = Url::parse(&self.url).map_err(|e| {
            FeedError::invalid_url(format!("cannot parse feed URL: {e}"))
                .with_feed(self.redacted())
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(FeedError::invalid_url(format!("unsupported scheme '{other}'"))
                .with_feed(self.redacted())),
        }
    }
}

// Keeps the API key out of `{:?}` output.
impl std::fmt::Debug for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSource")
            .field("url", &self.redacted())
            .field("source_type", &self.source_type)
            .finish()
    }
}

/// Retrieves the raw text of a feed.
pub trait DocumentFetcher: Send + Sync {
    fn fetch<'a>(&'a self, source: &'a FeedSource) -> BoxFuture<'a, FeedResult<String>>;
}

/// Fetches feeds over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("calendarr/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::network("failed to create HTTP client").with_source(e))?;
        Ok(Self { client })
    }

    async fn get(&self, source: &FeedSource) -> FeedResult<String> {
        let feed = source.redacted();
        source.validate()?;

        debug!(feed = %feed, "Fetching calendar feed");
        let response = self
            .client
            .get(source.url())
            .header(reqwest::header::ACCEPT, "text/calendar, */*")
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, &feed))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::http_status(status.as_u16()).with_feed(feed));
        }

        response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, &feed))
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, source: &'a FeedSource) -> BoxFuture<'a, FeedResult<String>> {
        Box::pin(self.get(source))
    }
}

fn map_reqwest_error(err: reqwest::Error, feed: &str) -> FeedError {
    // reqwest includes the URL, query string and all, in its messages.
    let err = err.without_url();
    let base = if err.is_timeout() {
        FeedError::timeout("request timed out")
    } else if err.is_decode() || err.is_body() {
        FeedError::network("failed to read response body")
    } else {
        FeedError::network("request failed")
    };
    base.with_feed(feed).with_source(err)
}

/// Fetches every source concurrently, each bounded by `timeout`.
///
/// Results keep the order of `sources`.
pub async fn fetch_all<'a, F>(
    fetcher: &'a F,
    sources: &'a [FeedSource],
    timeout: Duration,
) -> Vec<(&'a FeedSource, FeedResult<String>)>
where
    F: DocumentFetcher + ?Sized,
{
    let requests = sources.iter().map(|source| async move {
        let result = match tokio::time::timeout(timeout, fetcher.fetch(source)).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::timeout(format!(
                "no response within {}s",
                timeout.as_secs()
            ))
            .with_feed(source.redacted())),
        };
        (source, result)
    });
    join_all(requests).await
}

/// Events merged from all feeds that could be loaded.
#[derive(Debug, Default)]
pub struct LoadedEvents {
    pub events: Vec<Event>,
    pub failures: Vec<FeedError>,
    /// Malformed entries dropped across all documents.
    pub skipped: usize,
    /// Feeds that were fetched and parsed.
    pub loaded_feeds: usize,
}

impl LoadedEvents {
    /// True when at least one feed was configured and none could be loaded.
    pub fn all_failed(&self) -> bool {
        self.loaded_feeds == 0 && !self.failures.is_empty()
    }
}

/// Fetches, parses and normalizes every feed into `tz`.
///
/// Recurring entries are expanded over `window`. A failing feed is logged and excluded; the others still contribute.
/// Events keep feed order, then document order.
pub async fn load_events<F>(
    fetcher: &F,
    sources: &[FeedSource],
    tz: Tz,
    window: &ExpansionWindow,
    timeout: Duration,
) -> LoadedEvents
where
    F: DocumentFetcher + ?Sized,
{
    let mut loaded = LoadedEvents::default();

    for (source, result) in fetch_all(fetcher, sources, timeout).await {
        let feed = source.redacted();
        let parsed = result.and_then(|text| parse_ics_document(&text, &feed));
        match parsed {
            Ok(mut doc) => {
                doc.events = expand_recurrences(doc.events, tz, window);
                let events = normalize_document(&doc, source.source_type(), tz);
                info!(
                    feed = %feed,
                    source_type = %source.source_type(),
                    events = events.len(),
                    skipped = doc.skipped,
                    "Loaded calendar feed"
                );
                loaded.skipped += doc.skipped;
                loaded.loaded_feeds += 1;
                loaded.events.extend(events);
            }
            Err(err) => {
                warn!(
                    feed = %feed,
                    code = %err.code(),
                    retryable = err.is_retryable(),
                    "Calendar feed excluded from this run: {}",
                    err.message()
                );
                loaded.failures.push(err);
            }
        }
    }

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedErrorCode;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SONARR_ICS: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        BEGIN:VEVENT\r\n\
        UID:NzbDrone_episode_1\r\n\
        DTSTART:20250311T010000Z\r\n\
        SUMMARY:Severance - 2x08 - Sweet Vitriol\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    const RADARR_ICS: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        BEGIN:VEVENT\r\n\
        UID:Radarr_movie_1\r\n\
        DTSTART;VALUE=DATE:20250314\r\n\
        SUMMARY:Mickey 17\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    fn window() -> ExpansionWindow {
        let day = |d| chrono::NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        ExpansionWindow::for_dates(Tz::UTC, day(10), day(17))
    }

    struct StaticFetcher(Vec<FeedResult<String>>);

    impl DocumentFetcher for StaticFetcher {
        fn fetch<'a>(&'a self, source: &'a FeedSource) -> BoxFuture<'a, FeedResult<String>> {
            let index: usize = source.url().trim_start_matches("mem://").parse().unwrap_or(0);
            let result = match &self.0[index] {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(FeedError::new(e.code(), e.message())),
            };
            Box::pin(async move { result })
        }
    }

    struct SlowFetcher;

    impl DocumentFetcher for SlowFetcher {
        fn fetch<'a>(&'a self, _source: &'a FeedSource) -> BoxFuture<'a, FeedResult<String>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(String::new())
            })
        }
    }

    mod source {
        use super::*;

        #[test]
        fn debug_hides_api_key() {
            let source = FeedSource::tv("http://sonarr:8989/feed.ics?apikey=secret");
            let debug = format!("{source:?}");
            assert!(!debug.contains("secret"));
            assert!(debug.contains("sonarr:8989"));
        }

        #[test]
        fn validate_scheme() {
            assert!(FeedSource::tv("https://sonarr.local/feed.ics").validate().is_ok());
            let err = FeedSource::tv("ftp://sonarr.local/feed.ics").validate().unwrap_err();
            assert_eq!(err.code(), FeedErrorCode::InvalidUrl);
            let err = FeedSource::movie("not a url").validate().unwrap_err();
            assert_eq!(err.code(), FeedErrorCode::InvalidUrl);
        }
    }

    mod http {
        use super::*;

        #[tokio::test]
        async fn fetches_body() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/feed/v3/calendar/Sonarr.ics"))
                .and(query_param("apikey", "secret"))
                .respond_with(ResponseTemplate::new(200).set_body_string(SONARR_ICS))
                .mount(&server)
                .await;

            let source = FeedSource::tv(format!(
                "{}/feed/v3/calendar/Sonarr.ics?apikey=secret",
                server.uri()
            ));
            let body = fetcher().fetch(&source).await.unwrap();
            assert!(body.contains("Sweet Vitriol"));
        }

        #[tokio::test]
        async fn non_success_status() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(401))
                .mount(&server)
                .await;

            let source = FeedSource::tv(format!("{}/feed.ics?apikey=secret", server.uri()));
            let err = fetcher().fetch(&source).await.unwrap_err();
            assert_eq!(err.code(), FeedErrorCode::HttpStatus);
            assert!(err.is_retryable());
            assert!(!err.to_string().contains("secret"));
        }

        #[tokio::test]
        async fn connection_refused_is_network_error() {
            // Port 9 (discard) is closed on test machines.
            let source = FeedSource::tv("http://127.0.0.1:9/feed.ics?apikey=secret");
            let err = fetcher().fetch(&source).await.unwrap_err();
            assert!(matches!(
                err.code(),
                FeedErrorCode::Network | FeedErrorCode::Timeout
            ));
            assert!(!err.to_string().contains("secret"));
        }
    }

    mod loading {
        use super::*;

        #[tokio::test]
        async fn merges_feeds_and_excludes_failures() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/sonarr.ics"))
                .respond_with(ResponseTemplate::new(200).set_body_string(SONARR_ICS))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/radarr.ics"))
                .respond_with(ResponseTemplate::new(200).set_body_string(RADARR_ICS))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/broken.ics"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
                .mount(&server)
                .await;

            let sources = vec![
                FeedSource::tv(format!("{}/sonarr.ics", server.uri())),
                FeedSource::tv(format!("{}/broken.ics", server.uri())),
                FeedSource::movie(format!("{}/radarr.ics", server.uri())),
            ];
            let loaded = load_events(
                &fetcher(),
                &sources,
                chrono_tz::America::New_York,
                &window(),
                Duration::from_secs(5),
            )
            .await;

            assert_eq!(loaded.loaded_feeds, 2);
            assert_eq!(loaded.failures.len(), 1);
            assert_eq!(loaded.failures[0].code(), FeedErrorCode::InvalidDocument);
            assert!(!loaded.all_failed());

            let titles: Vec<_> = loaded.events.iter().map(|e| e.title.as_str()).collect();
            assert_eq!(titles, vec!["Severance", "Mickey 17"]);
            assert!(loaded.events[1].is_movie());
        }

        #[tokio::test]
        async fn all_failed() {
            let fetcher = StaticFetcher(vec![
                Err(FeedError::network("down")),
                Err(FeedError::http_status(500)),
            ]);
            let sources = vec![FeedSource::tv("mem://0"), FeedSource::movie("mem://1")];
            let loaded =
                load_events(&fetcher, &sources, Tz::UTC, &window(), Duration::from_secs(1)).await;
            assert!(loaded.all_failed());
            assert!(loaded.events.is_empty());
        }

        #[tokio::test]
        async fn no_sources_is_not_a_failure() {
            let loaded =
                load_events(&StaticFetcher(vec![]), &[], Tz::UTC, &window(), Duration::from_secs(1))
                    .await;
            assert!(!loaded.all_failed());
        }

        #[tokio::test(start_paused = true)]
        async fn slow_feed_times_out() {
            let sources = vec![FeedSource::tv("https://slow.example/feed.ics?apikey=secret")];
            let results = fetch_all(&SlowFetcher, &sources, Duration::from_secs(2)).await;
            let err = results[0].1.as_ref().unwrap_err();
            assert_eq!(err.code(), FeedErrorCode::Timeout);
            assert_eq!(err.feed(), Some("https://slow.example/feed.ics?…"));
        }
    }
}
