//! Settings model and validation.
//!
//! [`Settings`] mirrors the configuration file: every field has a default and
//! enumerated values are kept as text so that a typo is reported as a
//! [`ConfigError`] naming the field instead of a generic parse failure.
//! [`Settings::validate`] turns it into the typed [`RunSettings`] a run needs.
//!
//! Secret references (`env::VAR`) and footer files are resolved by the caller
//! before validation.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use calendarr_core::{
    CalendarRange, DiscordFormatter, FormatOptions, PassedEventPolicy, PipelineSettings, Platform,
    PlatformFormatter, ScheduleType, SlackFormatter, SourceType, TimeDisplay, TimeFormat,
    WeekStart,
};
use calendarr_providers::{FeedSource, redact_url};

use crate::error::ConfigError;
use crate::cron::CronSchedule;
use crate::schedule::{Schedule, parse_run_time, parse_schedule_day};
use crate::webhook::{RetryPolicy, WebhookUrl};

const REDACTED: &str = "<redacted>";

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub calendar: CalendarSettings,
    pub schedule: ScheduleSettings,
    pub display: DisplaySettings,
    pub discord: DiscordSettings,
    pub slack: SlackSettings,
    pub http: HttpSettings,
}

/// One `[[calendar.feeds]]` entry.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedSettings {
    pub url: String,
    /// `tv` (Sonarr) or `movie` (Radarr).
    #[serde(rename = "type", default = "default_feed_type")]
    pub kind: String,
}

impl fmt::Debug for FeedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSettings")
            .field("url", &redact_url(&self.url))
            .field("kind", &self.kind)
            .finish()
    }
}

fn default_feed_type() -> String {
    "tv".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarSettings {
    pub feeds: Vec<FeedSettings>,
    /// IANA timezone name.
    pub timezone: String,
    /// `DAY`, `WEEK` or `AUTO`.
    pub range: String,
    pub start_week_on_monday: bool,
    pub deduplicate: bool,
    pub show_empty_days: bool,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            timezone: "UTC".to_string(),
            range: "AUTO".to_string(),
            start_week_on_monday: true,
            deduplicate: true,
            show_empty_days: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    /// `DAILY` or `WEEKLY`.
    #[serde(rename = "type")]
    pub schedule_type: String,
    /// `HH:MM` in the calendar timezone.
    pub run_time: String,
    /// Weekday for weekly schedules: `0`-`7` (cron style) or a name.
    pub schedule_day: String,
    /// Five-field crontab expression. Replaces `run_time` and
    /// `schedule_day` when set; `type` still picks the report range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    pub run_on_startup: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            schedule_type: "WEEKLY".to_string(),
            run_time: "09:00".to_string(),
            schedule_day: "1".to_string(),
            cron: None,
            run_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplaySettings {
    pub header: String,
    pub show_date_range: bool,
    pub show_timezone: bool,
    pub use_24_hour: bool,
    pub add_leading_zero: bool,
    pub display_time: bool,
    /// `DISPLAY`, `HIDE` or `STRIKE`.
    pub passed_events: String,
    /// Footer for every platform unless overridden per platform.
    pub footer: Option<String>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            header: "TV Guide".to_string(),
            show_date_range: true,
            show_timezone: false,
            use_24_hour: false,
            add_leading_zero: true,
            display_time: true,
            passed_events: "DISPLAY".to_string(),
            footer: None,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscordSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    /// Role pinged in the header message.
    pub mention_role_id: Option<String>,
    /// Text following the role mention.
    pub mention_text: Option<String>,
    pub footer: Option<String>,
    /// File whose content becomes the footer. Read by the caller.
    pub footer_file: Option<PathBuf>,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            mention_role_id: None,
            mention_text: None,
            footer: None,
            footer_file: None,
        }
    }
}

impl fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("enabled", &self.enabled)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| REDACTED))
            .field("mention_role_id", &self.mention_role_id)
            .field("mention_text", &self.mention_text)
            .field("footer", &self.footer)
            .field("footer_file", &self.footer_file)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlackSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub footer: Option<String>,
    pub footer_file: Option<PathBuf>,
}

impl fmt::Debug for SlackSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackSettings")
            .field("enabled", &self.enabled)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| REDACTED))
            .field("footer", &self.footer)
            .field("footer_file", &self.footer_file)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Retries per webhook payload.
    pub retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
        }
    }
}

/// Where and how one platform is delivered to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTarget {
    pub platform: Platform,
    pub webhook: WebhookUrl,
    /// Discord role id and optional text.
    pub mention: Option<(String, Option<String>)>,
    pub footer: Option<String>,
}

impl DeliveryTarget {
    pub fn formatter(&self) -> Box<dyn PlatformFormatter> {
        match self.platform {
            Platform::Discord => {
                let formatter = DiscordFormatter::new();
                Box::new(match &self.mention {
                    Some((role, text)) => formatter.with_mention(role.clone(), text.clone()),
                    None => formatter,
                })
            }
            Platform::Slack => Box::new(SlackFormatter::new()),
        }
    }
}

/// Validated, typed settings for running.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub feeds: Vec<FeedSource>,
    pub timezone: Tz,
    pub pipeline: PipelineSettings,
    pub schedule: Schedule,
    pub run_on_startup: bool,
    pub targets: Vec<DeliveryTarget>,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
}

impl RunSettings {
    /// Formatters for every target, in target order.
    pub fn formatters(&self) -> Vec<Box<dyn PlatformFormatter>> {
        self.targets.iter().map(DeliveryTarget::formatter).collect()
    }

    pub fn target(&self, platform: Platform) -> Option<&DeliveryTarget> {
        self.targets.iter().find(|t| t.platform == platform)
    }
}

fn parse_field<T: std::str::FromStr<Err = String>>(
    field: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|message: String| ConfigError::invalid_value(field, message))
}

fn validate_webhook(platform: Platform, url: Option<&str>) -> Result<WebhookUrl, ConfigError> {
    let url = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::MissingWebhook { platform })?;
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidWebhook {
        platform,
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidWebhook {
            platform,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(WebhookUrl::new(url))
}

fn non_empty(text: Option<&String>) -> Option<String> {
    text.map(|t| t.trim()).filter(|t| !t.is_empty()).map(str::to_string)
}

impl Settings {
    /// Checks everything and builds the typed settings.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<RunSettings, ConfigError> {
        if self.calendar.feeds.is_empty() {
            return Err(ConfigError::NoCalendars);
        }
        let feeds = self
            .calendar
            .feeds
            .iter()
            .enumerate()
            .map(|(index, feed)| {
                let source_type: SourceType = feed
                    .kind
                    .parse()
                    .map_err(|reason| ConfigError::InvalidFeed { index, reason })?;
                let source = FeedSource::new(feed.url.trim(), source_type);
                source.validate().map_err(|e| ConfigError::InvalidFeed {
                    index,
                    reason: e.message().to_string(),
                })?;
                Ok(source)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let timezone: Tz = self
            .calendar
            .timezone
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.calendar.timezone.clone()))?;

        let schedule_type: ScheduleType = parse_field("schedule.type", &self.schedule.schedule_type)?;
        let range: CalendarRange = parse_field("calendar.range", &self.calendar.range)?;
        let passed_events: PassedEventPolicy =
            parse_field("display.passed_events", &self.display.passed_events)?;

        let schedule = match non_empty(self.schedule.cron.as_ref()) {
            Some(expression) => Schedule::Cron(CronSchedule::parse(&expression)?),
            None => {
                let time = parse_run_time(&self.schedule.run_time)?;
                match schedule_type {
                    ScheduleType::Daily => Schedule::Daily { time },
                    ScheduleType::Weekly => Schedule::Weekly {
                        weekday: parse_schedule_day(&self.schedule.schedule_day)?,
                        time,
                    },
                }
            }
        };

        let targets = self.targets()?;
        self.check_text_limits(&targets)?;

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "http.timeout_secs",
                "must be greater than zero",
            ));
        }

        let format = FormatOptions {
            header: self.display.header.clone(),
            show_date_range: self.display.show_date_range,
            show_timezone: self.display.show_timezone,
            time: TimeDisplay {
                format: if self.display.use_24_hour {
                    TimeFormat::H24
                } else {
                    TimeFormat::H12
                },
                leading_zero: self.display.add_leading_zero,
                show_time: self.display.display_time,
            },
            passed_events,
            show_empty_days: self.calendar.show_empty_days,
            footer: non_empty(self.display.footer.as_ref()),
        };

        Ok(RunSettings {
            feeds,
            timezone,
            pipeline: PipelineSettings {
                schedule: schedule_type,
                range,
                week_start: if self.calendar.start_week_on_monday {
                    WeekStart::Monday
                } else {
                    WeekStart::Sunday
                },
                deduplicate: self.calendar.deduplicate,
                format,
            },
            schedule,
            run_on_startup: self.schedule.run_on_startup,
            targets,
            http_timeout: Duration::from_secs(self.http.timeout_secs),
            retry: RetryPolicy::default().with_max_retries(self.http.retries),
        })
    }

    /// The header and footers must fit the messages carrying them.
    fn check_text_limits(&self, targets: &[DeliveryTarget]) -> Result<(), ConfigError> {
        for target in targets {
            let formatter = target.formatter();
            let limits = formatter.limits();
            let too_long = |field: &'static str, chars: usize, limit: usize| {
                ConfigError::invalid_value(
                    field,
                    format!("{chars} characters, {} allows {limit}", target.platform),
                )
            };

            let header = formatter.header(&self.display.header);
            let chars = match formatter.mention() {
                Some(mention) => mention.chars().count() + 1 + header.chars().count(),
                None => header.chars().count(),
            };
            if chars > limits.max_header_chars {
                return Err(too_long("display.header", chars, limits.max_header_chars));
            }

            if let Some(footer) = &target.footer {
                let chars = footer.chars().count();
                if chars > limits.max_text_chars {
                    let field = self.footer_field(target.platform);
                    return Err(too_long(field, chars, limits.max_text_chars));
                }
            }
        }
        Ok(())
    }

    /// Where a platform's footer came from.
    fn footer_field(&self, platform: Platform) -> &'static str {
        match platform {
            Platform::Discord if non_empty(self.discord.footer.as_ref()).is_some() => {
                "discord.footer"
            }
            Platform::Slack if non_empty(self.slack.footer.as_ref()).is_some() => "slack.footer",
            _ => "display.footer",
        }
    }

    fn targets(&self) -> Result<Vec<DeliveryTarget>, ConfigError> {
        if !self.discord.enabled && !self.slack.enabled {
            return Err(ConfigError::NoPlatformEnabled);
        }
        let default_footer = non_empty(self.display.footer.as_ref());
        let mut targets = Vec::new();

        if self.discord.enabled {
            let webhook = validate_webhook(Platform::Discord, self.discord.webhook_url.as_deref())?;
            let mention = non_empty(self.discord.mention_role_id.as_ref())
                .map(|role| (role, non_empty(self.discord.mention_text.as_ref())));
            targets.push(DeliveryTarget {
                platform: Platform::Discord,
                webhook,
                mention,
                footer: non_empty(self.discord.footer.as_ref()).or_else(|| default_footer.clone()),
            });
        }
        if self.slack.enabled {
            let webhook = validate_webhook(Platform::Slack, self.slack.webhook_url.as_deref())?;
            targets.push(DeliveryTarget {
                platform: Platform::Slack,
                webhook,
                mention: None,
                footer: non_empty(self.slack.footer.as_ref()).or(default_footer),
            });
        }
        Ok(targets)
    }

    /// A copy safe to print: webhook URLs replaced, feed URLs redacted.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for feed in &mut copy.calendar.feeds {
            feed.url = redact_url(&feed.url);
        }
        for url in [&mut copy.discord.webhook_url, &mut copy.slack.webhook_url]
            .into_iter()
            .flatten()
        {
            *url = REDACTED.to_string();
        }
        copy
    }
}
