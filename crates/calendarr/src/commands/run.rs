//! Scheduler daemon.

use std::sync::Arc;

use calendarr_server::{RunSettings, Runner, Scheduler, SchedulerConfig, SignalHandler};
use tracing::info;

use crate::error::ClientResult;

/// Posts reports on the configured schedule until SIGINT/SIGTERM.
///
/// A run in progress when the signal arrives is finished before exiting.
pub async fn run(settings: RunSettings) -> ClientResult<()> {
    let config = SchedulerConfig::new(settings.schedule, settings.timezone)
        .with_run_on_startup(settings.run_on_startup);
    let runner = Arc::new(Runner::new(settings)?);

    info!(
        feeds = runner.settings().feeds.len(),
        platforms = runner.settings().targets.len(),
        "Starting calendarr"
    );

    let scheduler = Scheduler::new(config);
    let handle = scheduler.handle();

    let signals = SignalHandler::new();
    signals.spawn_listener();

    let job = move || {
        let runner = runner.clone();
        async move {
            runner
                .run_once()
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
    };

    let scheduler = scheduler.run(job);
    tokio::pin!(scheduler);

    tokio::select! {
        () = &mut scheduler => return Ok(()),
        () = signals.shutdown().wait() => {}
    }

    info!("Shutdown requested");
    let _ = handle.stop().await;
    scheduler.await;
    info!("Stopped");
    Ok(())
}
