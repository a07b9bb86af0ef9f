//! Client error types.

use std::path::PathBuf;
use std::process::ExitCode;

use calendarr_core::{Platform, TracingError};
use calendarr_server::{ConfigError, ServerError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    /// Settings were read but are not usable.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A secret reference could not be resolved.
    #[error("cannot resolve {field}: {message}")]
    Secret { field: String, message: String },

    #[error("{0} is not enabled in the configuration")]
    PlatformDisabled(Platform),

    #[error(transparent)]
    Server(ServerError),

    #[error("failed to initialize logging: {0}")]
    Tracing(#[from] TracingError),

    #[error("failed to serialize {what}: {message}")]
    Serialize { what: &'static str, message: String },
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Config(e) => Self::Config(e),
            other => Self::Server(other),
        }
    }
}

impl ClientError {
    pub fn secret(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Secret {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Process exit code: 2 for configuration problems, 3 when no feed could
    /// be loaded, 4 when a platform rejected delivery, 1 otherwise.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::Config(_)
            | Self::Secret { .. }
            | Self::PlatformDisabled(_) => 2,
            Self::Server(ServerError::AllFeedsFailed { .. }) => 3,
            Self::Server(ServerError::Delivery { .. }) => 4,
            _ => 1,
        }
    }
}
