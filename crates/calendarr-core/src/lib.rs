//! Core types and the release-report pipeline: events, date ranges, dedup,
//! grouping, classification, platform formatting and batching.

pub mod batch;
pub mod classify;
pub mod dedup;
pub mod event;
pub mod format;
pub mod group;
pub mod pipeline;
pub mod time;
pub mod tracing;

pub use batch::{Batch, BatchLimits, FormattingOverflow, pack, split_block, split_target};
pub use classify::{Classification, Classifier};
pub use dedup::{DedupKey, deduplicate, normalize_title};
pub use event::{Event, SourceType};
pub use format::{
    DiscordFormatter, FormatOptions, FormattedBlock, FormattedReport, PassedEventPolicy, Platform,
    PlatformFormatter, SlackFormatter, TimeDisplay, TimeFormat,
};
pub use group::{Day, group_by_day};
pub use pipeline::{PipelineSettings, PlatformMessage, run_pipeline};
pub use time::{CalendarRange, DateRange, RunContext, ScheduleType, WeekStart, local_midnight};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
