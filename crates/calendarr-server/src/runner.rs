//! One run: fetch feeds, build the report, deliver it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use calendarr_core::{Platform, PlatformFormatter, PlatformMessage, RunContext, run_pipeline};
use calendarr_providers::{DocumentFetcher, ExpansionWindow, HttpFetcher, load_events};

use crate::config::{DeliveryTarget, RunSettings};
use crate::error::{ServerError, ServerResult};
use crate::webhook::WebhookClient;

/// A built message with the target it goes to.
pub struct PreparedMessage<'a> {
    pub target: &'a DeliveryTarget,
    pub formatter: Box<dyn PlatformFormatter>,
    pub message: PlatformMessage,
}

/// Outcome of delivering to every target.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub events: usize,
    pub failed_feeds: usize,
    /// Payloads sent per platform.
    pub delivered: Vec<(Platform, usize)>,
    pub failures: Vec<ServerError>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs reports with fixed settings.
pub struct Runner {
    settings: RunSettings,
    fetcher: Arc<dyn DocumentFetcher>,
    webhooks: WebhookClient,
}

impl Runner {
    /// Creates a runner fetching feeds over HTTP.
    pub fn new(settings: RunSettings) -> ServerResult<Self> {
        let fetcher = HttpFetcher::new(settings.http_timeout)
            .map_err(|e| ServerError::http(e.to_string()))?;
        Self::with_fetcher(settings, Arc::new(fetcher))
    }

    /// Creates a runner with a custom feed fetcher.
    pub fn with_fetcher(
        settings: RunSettings,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> ServerResult<Self> {
        let webhooks = WebhookClient::new(settings.http_timeout, settings.retry)?;
        Ok(Self {
            settings,
            fetcher,
            webhooks,
        })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Fetches the feeds and builds the messages for every target, or only
    /// for `only` when given.
    ///
    /// # Errors
    ///
    /// Fails with [`ServerError::AllFeedsFailed`] when no feed could be
    /// loaded.
    pub async fn prepare(
        &self,
        now: DateTime<Utc>,
        only: Option<Platform>,
    ) -> ServerResult<(Vec<PreparedMessage<'_>>, RunSummary)> {
        let settings = &self.settings;
        let ctx = RunContext::new(now, settings.timezone);
        let range = settings.pipeline.date_range(&ctx);
        let window = ExpansionWindow::for_dates(settings.timezone, range.start, range.end);
        let loaded = load_events(
            self.fetcher.as_ref(),
            &settings.feeds,
            settings.timezone,
            &window,
            settings.http_timeout,
        )
        .await;
        if loaded.all_failed() {
            return Err(ServerError::AllFeedsFailed {
                count: loaded.failures.len(),
            });
        }

        let summary = RunSummary {
            events: loaded.events.len(),
            failed_feeds: loaded.failures.len(),
            ..Default::default()
        };

        let targets: Vec<&DeliveryTarget> = settings
            .targets
            .iter()
            .filter(|t| only.is_none_or(|p| p == t.platform))
            .collect();
        let formatters: Vec<Box<dyn PlatformFormatter>> =
            targets.iter().map(|t| t.formatter()).collect();

        let messages = run_pipeline(loaded.events, &ctx, &settings.pipeline, &formatters);

        let prepared = targets
            .into_iter()
            .zip(formatters)
            .zip(messages)
            .map(|((target, formatter), mut message)| {
                if let Some(footer) = &target.footer {
                    message.footer_payload = Some(formatter.footer_payload(footer));
                }
                PreparedMessage {
                    target,
                    formatter,
                    message,
                }
            })
            .collect();

        Ok((prepared, summary))
    }

    /// Builds the messages without sending them.
    pub async fn preview(
        &self,
        now: DateTime<Utc>,
        only: Option<Platform>,
    ) -> ServerResult<Vec<PlatformMessage>> {
        let (prepared, _) = self.prepare(now, only).await?;
        Ok(prepared.into_iter().map(|p| p.message).collect())
    }

    /// Runs once at `now` and delivers to every target.
    ///
    /// A failing platform does not prevent delivery to the others; the first
    /// delivery failure is returned after all targets were attempted.
    pub async fn run_at(&self, now: DateTime<Utc>) -> ServerResult<RunSummary> {
        let (prepared, mut summary) = self.prepare(now, None).await?;

        for item in prepared {
            let platform = item.target.platform;
            match self
                .webhooks
                .deliver(&item.message, item.formatter.as_ref(), &item.target.webhook)
                .await
            {
                Ok(sent) => summary.delivered.push((platform, sent)),
                Err(e) => {
                    error!(platform = %platform, error = %e, "Delivery failed");
                    summary.failures.push(e);
                }
            }
        }

        if summary.failed_feeds > 0 {
            warn!(failed_feeds = summary.failed_feeds, "Report built without some feeds");
        }
        info!(
            events = summary.events,
            platforms = summary.delivered.len(),
            failures = summary.failures.len(),
            "Run finished"
        );

        if summary.failures.is_empty() {
            Ok(summary)
        } else {
            Err(summary.failures.remove(0))
        }
    }

    /// Runs once now.
    pub async fn run_once(&self) -> ServerResult<RunSummary> {
        self.run_at(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use calendarr_providers::{BoxFuture, FeedError, FeedResult, FeedSource};
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SONARR_ICS: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        BEGIN:VEVENT\r\n\
        UID:ep-1\r\n\
        DTSTART:20250311T010000Z\r\n\
        SUMMARY:Severance - 2x08 - Sweet Vitriol\r\n\
        END:VEVENT\r\n\
        BEGIN:VEVENT\r\n\
        UID:ep-2\r\n\
        DTSTART:20250312T010000Z\r\n\
        SUMMARY:Daredevil: Born Again - S01E01 - Heaven's Half Hour\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    const WEEKLY_ICS: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        BEGIN:VEVENT\r\n\
        UID:weekly\r\n\
        DTSTART;TZID=America/New_York:20250107T200000\r\n\
        RRULE:FREQ=WEEKLY\r\n\
        SUMMARY:Late Night - 1x01 - Opening\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    /// Serves `mem://ok` and `mem://weekly`, fails anything else.
    struct MemoryFetcher;

    impl DocumentFetcher for MemoryFetcher {
        fn fetch<'a>(&'a self, source: &'a FeedSource) -> BoxFuture<'a, FeedResult<String>> {
            Box::pin(async move {
                match source.url() {
                    "mem://ok" => Ok(SONARR_ICS.to_string()),
                    "mem://weekly" => Ok(WEEKLY_ICS.to_string()),
                    _ => Err(FeedError::network("unreachable").with_feed(source.redacted())),
                }
            })
        }
    }

    fn settings(discord: &str, slack: Option<&str>, feeds: &[&str]) -> RunSettings {
        let mut value = json!({
            "calendar": {
                "feeds": [{"url": "https://sonarr.invalid/feed.ics"}],
                "timezone": "America/New_York"
            },
            "discord": {"webhook_url": discord},
            "http": {"retries": 0}
        });
        if let Some(slack) = slack {
            value["slack"] = json!({"enabled": true, "webhook_url": slack});
        }
        let settings: Settings = serde_json::from_value(value).unwrap();
        let mut run = settings.validate().unwrap();
        // `mem://` feeds are served by MemoryFetcher and would not validate.
        run.feeds = feeds.iter().map(|u| FeedSource::tv(*u)).collect();
        run
    }

    fn runner(settings: RunSettings) -> Runner {
        Runner::with_fetcher(settings, Arc::new(MemoryFetcher)).unwrap()
    }

    fn monday() -> DateTime<Utc> {
        // Monday 2025-03-10, 08:00 in New York.
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn preview_builds_messages() {
        let run = settings(
            "https://discord.invalid/hook",
            Some("https://slack.invalid/hook"),
            &["mem://ok"],
        );
        let messages = runner(run).preview(monday(), None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].platform, Platform::Discord);
        assert_eq!(messages[0].line_count(), 2);
        assert!(messages[0].subheader.contains("season premiere"));

        let only_slack = runner(settings(
            "https://discord.invalid/hook",
            Some("https://slack.invalid/hook"),
            &["mem://ok"],
        ))
        .preview(monday(), Some(Platform::Slack))
        .await
        .unwrap();
        assert_eq!(only_slack.len(), 1);
        assert_eq!(only_slack[0].platform, Platform::Slack);
    }

    #[tokio::test]
    async fn recurring_entry_reported_in_current_week() {
        let run = settings("https://discord.invalid/hook", None, &["mem://weekly"]);
        let messages = runner(run).preview(monday(), None).await.unwrap();
        assert_eq!(messages[0].line_count(), 1);
        let payloads = serde_json::to_string(&messages[0].payloads()).unwrap();
        assert!(payloads.contains("Late Night"));
    }

    #[tokio::test]
    async fn footer_attached_per_target() {
        let mut run = settings("https://discord.invalid/hook", None, &["mem://ok"]);
        run.targets[0].footer = Some("See you next week".to_string());
        let messages = runner(run).preview(monday(), None).await.unwrap();
        assert_eq!(
            messages[0].footer_payload,
            Some(json!({"content": "See you next week"}))
        );
    }

    #[tokio::test]
    async fn all_feeds_failed() {
        let run = settings("https://discord.invalid/hook", None, &["mem://down", "mem://gone"]);
        let err = runner(run).run_at(monday()).await.unwrap_err();
        assert!(matches!(err, ServerError::AllFeedsFailed { count: 2 }));
    }

    #[tokio::test]
    async fn delivers_despite_one_failed_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/discord"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let run = settings(
            &format!("{}/discord", server.uri()),
            None,
            &["mem://ok", "mem://down"],
        );
        let summary = runner(run).run_at(monday()).await.unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.failed_feeds, 1);
        assert_eq!(summary.delivered, vec![(Platform::Discord, 2)]);
        assert!(summary.is_success());

        let requests = server.received_requests().await.unwrap();
        let header: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(header["content"].as_str().unwrap().starts_with("# TV Guide"));
    }

    #[tokio::test]
    async fn one_platform_failing_does_not_stop_the_other() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/discord"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/slack"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let run = settings(
            &format!("{}/discord", server.uri()),
            Some(&format!("{}/slack", server.uri())),
            &["mem://ok"],
        );
        let err = runner(run).run_at(monday()).await.unwrap_err();
        assert!(matches!(err, ServerError::Delivery { platform: Platform::Discord, .. }));

        let slack_posts = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/slack")
            .count();
        assert_eq!(slack_posts, 2);
    }
}
