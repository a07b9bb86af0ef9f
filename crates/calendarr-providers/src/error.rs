//! Errors raised while fetching or parsing a calendar feed.
//!
//! Feed errors are recovered at the feed boundary: the failing feed is
//! logged and left out of the run. The feed is identified by its redacted URL
//! so API keys in query strings never reach the logs.

use std::fmt;
use thiserror::Error;

/// Category of a feed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedErrorCode {
    /// Connection refused, DNS failure, TLS failure, broken body.
    Network,
    /// The request did not finish within the allotted time.
    Timeout,
    /// The server answered with a non-success status.
    HttpStatus,
    /// The body is not an iCalendar document.
    InvalidDocument,
    /// The configured feed URL cannot be parsed.
    InvalidUrl,
}

impl FeedErrorCode {
    /// True for errors worth retrying on the next run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::HttpStatus)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::InvalidDocument => "invalid_document",
            Self::InvalidUrl => "invalid_url",
        }
    }

    /// True for errors about the document rather than its transport.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::InvalidDocument)
    }
}

impl fmt::Display for FeedErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error for a single feed.
#[derive(Debug, Error)]
pub struct FeedError {
    code: FeedErrorCode,
    message: String,
    /// Redacted feed URL.
    feed: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FeedError {
    pub fn new(code: FeedErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            feed: None,
            source: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::Timeout, message)
    }

    pub fn http_status(status: u16) -> Self {
        Self::new(
            FeedErrorCode::HttpStatus,
            format!("server answered with status {status}"),
        )
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::InvalidDocument, message)
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::InvalidUrl, message)
    }

    /// Attaches the feed this error is about. Pass an already redacted URL.
    pub fn with_feed(mut self, feed: impl Into<String>) -> Self {
        self.feed = Some(feed.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> FeedErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn feed(&self) -> Option<&str> {
        self.feed.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref feed) = self.feed {
            write!(f, "[{feed}] ")?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
