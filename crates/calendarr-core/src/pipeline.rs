//! The pure part of a run: events in, per-platform messages out.
//!
//! Nothing here performs I/O or reads the clock; "now" and the timezone come
//! from the [`RunContext`]. Running the pipeline twice on the same input
//! yields the same messages.
//!
//! Order: range filter, dedup, grouping, classification, formatting,
//! batching.

use serde_json::Value;
use tracing::{debug, info};

use crate::batch::{Batch, pack};
use crate::classify::Classifier;
use crate::dedup::deduplicate;
use crate::event::Event;
use crate::format::{FormatOptions, Platform, PlatformFormatter, render_report};
use crate::group::group_by_day;
use crate::time::{CalendarRange, DateRange, RunContext, ScheduleType, WeekStart};

/// Processing options that do not depend on the target platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub schedule: ScheduleType,
    pub range: CalendarRange,
    pub week_start: WeekStart,
    pub deduplicate: bool,
    pub format: FormatOptions,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            schedule: ScheduleType::Weekly,
            range: CalendarRange::Auto,
            week_start: WeekStart::Monday,
            deduplicate: true,
            format: FormatOptions::default(),
        }
    }
}

impl PipelineSettings {
    /// The date range covered by a run at `ctx`.
    pub fn date_range(&self, ctx: &RunContext) -> DateRange {
        DateRange::for_run(self.range.resolve(self.schedule), self.week_start, ctx)
    }
}

/// Everything to send to one platform, in order: header, batches, footer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformMessage {
    pub platform: Platform,
    pub header: String,
    pub subheader: String,
    pub mention: Option<String>,
    pub header_payload: Value,
    pub batches: Vec<Batch>,
    pub footer_payload: Option<Value>,
}

impl PlatformMessage {
    /// All payload bodies in send order.
    pub fn payloads(&self) -> Vec<&Value> {
        std::iter::once(&self.header_payload)
            .chain(self.batches.iter().map(|b| &b.payload))
            .chain(self.footer_payload.iter())
            .collect()
    }

    /// Total event lines across batches.
    pub fn line_count(&self) -> usize {
        self.batches.iter().map(Batch::line_count).sum()
    }
}

/// Runs dedup, grouping, classification, formatting and batching.
pub fn run_pipeline(
    events: Vec<Event>,
    ctx: &RunContext,
    settings: &PipelineSettings,
    formatters: &[Box<dyn PlatformFormatter>],
) -> Vec<PlatformMessage> {
    let received = events.len();
    let range = settings.date_range(ctx);
    // Feeds carry past releases too; an out-of-range copy must not win dedup.
    let in_range: Vec<Event> = events
        .into_iter()
        .filter(|e| range.contains(e.local_date()))
        .collect();
    let in_range_count = in_range.len();
    let events = deduplicate(in_range, settings.deduplicate);
    debug!(
        start = %range.start,
        end = %range.end,
        received,
        in_range = in_range_count,
        unique = events.len(),
        "Grouping events"
    );

    let days = group_by_day(
        events,
        &range,
        settings.week_start,
        settings.format.show_empty_days,
    );
    let classifier = Classifier::new(&days);

    formatters
        .iter()
        .map(|formatter| {
            let report = render_report(
                formatter.as_ref(),
                &days,
                &classifier,
                &range,
                ctx,
                &settings.format,
            );
            let header_payload = formatter.header_payload(&report);
            let footer_payload = report.footer.as_deref().map(|f| formatter.footer_payload(f));

            let mut batches = pack(report.blocks, &formatter.limits());
            for batch in &mut batches {
                batch.payload = formatter.batch_payload(batch);
            }

            info!(
                platform = %report.platform,
                days = days.len(),
                batches = batches.len(),
                "Formatted report"
            );

            PlatformMessage {
                platform: report.platform,
                header: report.header,
                subheader: report.subheader,
                mention: report.mention,
                header_payload,
                batches,
                footer_payload,
            }
        })
        .collect()
}
