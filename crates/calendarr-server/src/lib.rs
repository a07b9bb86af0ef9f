//! Run orchestration for calendarr.
//!
//! - [`Settings`] / [`RunSettings`] - configuration model and validation
//! - [`Runner`] - fetch, build and deliver one report
//! - [`WebhookClient`] - JSON delivery with retries
//! - [`Scheduler`] - daily, weekly or cron runs in the configured timezone
//! - [`SignalHandler`] - graceful shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use calendarr_server::{Runner, Settings};
//!
//! # async fn example(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
//! let runner = Runner::new(settings.validate()?)?;
//! let summary = runner.run_once().await?;
//! println!("{} events delivered", summary.events);
//! # Ok(())
//! # }
//! ```

mod config;
mod cron;
mod error;
mod runner;
mod schedule;
mod scheduler;
mod signals;
mod webhook;

pub use config::{
    CalendarSettings, DeliveryTarget, DiscordSettings, DisplaySettings, FeedSettings,
    HttpSettings, RunSettings, ScheduleSettings, Settings, SlackSettings,
};
pub use cron::CronSchedule;
pub use error::{ConfigError, ServerError, ServerResult};
pub use runner::{PreparedMessage, RunSummary, Runner};
pub use schedule::{Schedule, parse_run_time, parse_schedule_day};
pub use scheduler::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState,
};
pub use signals::{ShutdownSignal, SignalHandler};
pub use webhook::{RetryPolicy, WebhookClient, WebhookUrl, fit_batches, success_codes};
