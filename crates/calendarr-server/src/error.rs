//! Server error types.

use calendarr_core::Platform;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Invalid settings. Always fatal, raised before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no calendar feeds configured")]
    NoCalendars,

    #[error("at least one platform (discord or slack) must be enabled")]
    NoPlatformEnabled,

    #[error("{platform} is enabled but has no webhook URL")]
    MissingWebhook { platform: Platform },

    #[error("{platform} webhook URL is invalid: {reason}")]
    InvalidWebhook { platform: Platform, reason: String },

    #[error("feed #{index}: {reason}")]
    InvalidFeed { index: usize, reason: String },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("invalid run time '{0}' (expected HH:MM)")]
    InvalidRunTime(String),

    #[error("invalid schedule day '{0}' (expected 0-7 or a weekday name)")]
    InvalidScheduleDay(String),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Every configured feed failed to load.
    #[error("all {count} calendar feeds failed to load")]
    AllFeedsFailed { count: usize },

    /// A platform did not accept a message after all retries.
    #[error("delivery to {platform} failed: {message}")]
    Delivery { platform: Platform, message: String },

    /// HTTP client setup failed.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

impl ServerError {
    pub fn delivery(platform: Platform, message: impl Into<String>) -> Self {
        Self::Delivery {
            platform,
            message: message.into(),
        }
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = ServerError::from(ConfigError::MissingWebhook {
            platform: Platform::Slack,
        });
        assert_eq!(
            err.to_string(),
            "configuration error: slack is enabled but has no webhook URL"
        );
        assert_eq!(
            ServerError::AllFeedsFailed { count: 2 }.to_string(),
            "all 2 calendar feeds failed to load"
        );
        assert_eq!(
            ServerError::delivery(Platform::Discord, "status 400").to_string(),
            "delivery to discord failed: status 400"
        );
    }
}
