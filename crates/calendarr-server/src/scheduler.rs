//! Background scheduler for report runs.
//!
//! Runs a job at every slot of a [`Schedule`], with:
//! - an optional run right after startup
//! - manual runs through [`SchedulerHandle::run_now`]
//! - a few retries with exponential backoff when a scheduled run fails,
//!   after which the scheduler waits for the next slot

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::schedule::Schedule;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule: Schedule,
    pub timezone: Tz,
    /// Run once immediately when the loop starts.
    pub run_on_startup: bool,
    /// Initial backoff after a failed run.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Retries of a failed run before waiting for the next slot.
    pub max_retries: u32,
}

impl SchedulerConfig {
    pub fn new(schedule: Schedule, timezone: Tz) -> Self {
        Self {
            schedule,
            timezone,
            run_on_startup: false,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(900),
            backoff_multiplier: 2.0,
            max_retries: 3,
        }
    }

    pub fn with_run_on_startup(mut self, run: bool) -> Self {
        self.run_on_startup = run;
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Calculates the delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = base * multiplier;
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }

    /// Time to wait from `now` until the next slot.
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> (DateTime<Utc>, Duration) {
        let next = self.schedule.next_after(now, self.timezone);
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        (next, delay)
    }
}

/// Commands that can be sent to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run the job immediately.
    RunNow,
    /// Stop the scheduler.
    Stop,
}

/// Run bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Failed runs since the last success.
    pub consecutive_failures: u32,
    /// Retries already spent on the current slot.
    pub retry_attempt: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    pub runs: u64,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful run.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.retry_attempt = 0;
        self.last_success = Some(Utc::now());
        self.last_attempt = self.last_success;
        self.last_error = None;
        self.runs += 1;
    }

    /// Records a failed run.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.retry_attempt += 1;
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
        self.runs += 1;
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Runs a job on a schedule.
pub struct Scheduler {
    config: SchedulerConfig,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::new(RwLock::new(SchedulerState::new())),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for sending commands to the scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs the loop until [`SchedulerCommand::Stop`] is received or every
    /// handle is dropped.
    ///
    /// `job` returns `Ok(())` on success or an error message on failure.
    pub async fn run<F, Fut>(self, job: F)
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<(), String>> + Send,
    {
        let Self {
            config,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // Dropping our own sender lets the loop end once all handles are gone.
        drop(command_tx);

        info!(schedule = %config.schedule, timezone = %config.timezone, "Scheduler started");

        if config.run_on_startup {
            info!("Running on startup");
            run_job(&state, &job).await;
        }

        loop {
            let delay = next_delay(&config, &state).await;
            debug!(delay_secs = delay.as_secs(), "Waiting for next run");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    run_job(&state, &job).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::RunNow) => {
                            debug!("Received RunNow command");
                            run_job(&state, &job).await;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn next_delay(config: &SchedulerConfig, state: &SharedSchedulerState) -> Duration {
    let mut state = state.write().await;

    if state.retry_attempt > 0 && state.retry_attempt <= config.max_retries {
        let backoff = config.backoff_delay(state.retry_attempt);
        info!(
            attempt = state.retry_attempt,
            max = config.max_retries,
            backoff_secs = backoff.as_secs(),
            "Retrying failed run"
        );
        state.next_run = Some(Utc::now() + backoff);
        return backoff;
    }
    if state.retry_attempt > config.max_retries {
        warn!(
            failures = state.consecutive_failures,
            "Retries exhausted, waiting for the next scheduled run"
        );
    }
    state.retry_attempt = 0;

    let (next, delay) = config.delay_until_next(Utc::now());
    info!(next_run = %next.with_timezone(&config.timezone), "Next run scheduled");
    state.next_run = Some(next);
    delay
}

async fn run_job<F, Fut>(state: &SharedSchedulerState, job: &F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    debug!("Starting run");
    match job().await {
        Ok(()) => {
            info!("Run completed successfully");
            state.write().await.record_success();
        }
        Err(e) => {
            warn!(error = %e, "Run failed");
            state.write().await.record_failure(e);
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    /// Triggers an immediate run.
    pub async fn run_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::RunNow).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    /// Returns a snapshot of the scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Weekday};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn weekly() -> SchedulerConfig {
        SchedulerConfig::new(
            Schedule::Weekly {
                weekday: Weekday::Mon,
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            },
            Tz::UTC,
        )
    }

    #[test]
    fn config_backoff_delay() {
        let config = weekly().with_backoff(Duration::from_secs(5), Duration::from_secs(300), 2.0);

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(10), Duration::from_secs(300));
    }

    #[test]
    fn delay_until_next_slot() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap(); // Sunday
        let (next, delay) = weekly().delay_until_next(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 16, 9, 0, 0).unwrap());
        assert_eq!(delay, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn state_bookkeeping() {
        let mut state = SchedulerState::new();
        state.record_failure("feeds down");
        state.record_failure("feeds down");
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.retry_attempt, 2);
        assert_eq!(state.last_error.as_deref(), Some("feeds down"));

        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.retry_attempt, 0);
        assert!(state.last_success.is_some());
        assert!(state.last_error.is_none());
        assert_eq!(state.runs, 3);
    }

    #[tokio::test]
    async fn run_on_startup_and_commands() {
        let scheduler = Scheduler::new(weekly().with_run_on_startup(true));
        let handle = scheduler.handle();

        let count = Arc::new(AtomicU32::new(0));
        let job_count = count.clone();
        let task = tokio::spawn(async move {
            scheduler
                .run(move || {
                    let count = job_count.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.run_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let state = handle.state().await;
        assert_eq!(state.runs, 2);
        assert!(state.next_run.is_some());

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn no_startup_run_by_default() {
        let scheduler = Scheduler::new(weekly());
        let handle = scheduler.handle();
        let count = Arc::new(AtomicU32::new(0));
        let job_count = count.clone();
        let task = tokio::spawn(async move {
            scheduler
                .run(move || {
                    let count = job_count.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn retries_failed_run_with_backoff() {
        let config = weekly()
            .with_run_on_startup(true)
            .with_backoff(Duration::from_millis(10), Duration::from_millis(40), 2.0)
            .with_max_retries(2);
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();

        let attempts = Arc::new(AtomicU32::new(0));
        let job_attempts = attempts.clone();
        let task = tokio::spawn(async move {
            scheduler
                .run(move || {
                    let attempts = job_attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err("all feeds failed".to_string())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        // The startup run plus two retries, then the weekly slot is far away.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let state = handle.state().await;
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.retry_attempt, 0);

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_handles_dropped() {
        let scheduler = Scheduler::new(weekly());
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run(|| async { Ok(()) }));
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
