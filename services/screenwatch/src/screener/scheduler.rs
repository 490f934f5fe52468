//! Daily screening scheduler.
//!
//! A cooperative loop wakes every `check_interval_secs` and fires the
//! screening pipeline once per exchange-local weekday, after the configured
//! time. An error escaping an iteration backs the loop off for
//! `error_backoff_secs` without recording the run.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use screenwatch_common::{RetryPolicy, SchedulerConfig};

use super::clock::{is_weekday, Clock, ExchangeCalendar, ET_DATETIME_FORMAT, ET_TIME_FORMAT};
use super::marker::RunMarker;
use super::pipeline::{RunSummary, ScreeningPipeline};

// ============================================================================
// Scheduler State
// ============================================================================

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Loop not running
    Stopped,
    /// Loop running
    Running,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Trigger condition not met
    Skipped,
    /// Screening ran; `recorded` tells whether the day was marked done
    Ran { summary: RunSummary, recorded: bool },
}

/// Snapshot of scheduler state for callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub state: SchedulerState,
    /// Configured trigger time, e.g. "05:30 PM ET"
    pub screening_time: String,
    pub last_run: Option<NaiveDate>,
    pub current_time_et: String,
    pub next_run: String,
    pub retry_policy: RetryPolicy,
    pub last_summary: Option<RunSummary>,
}

// ============================================================================
// Screening Scheduler
// ============================================================================

/// Fires the screening pipeline once per trading day.
pub struct ScreeningScheduler {
    pipeline: Arc<ScreeningPipeline>,
    marker: Arc<dyn RunMarker>,
    clock: Arc<dyn Clock>,
    calendar: ExchangeCalendar,
    config: SchedulerConfig,
    screening_time: NaiveTime,
    state: RwLock<SchedulerState>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    last_summary: RwLock<Option<RunSummary>>,
}

impl ScreeningScheduler {
    pub fn new(
        pipeline: Arc<ScreeningPipeline>,
        marker: Arc<dyn RunMarker>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let screening_time = config.screening_time()?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            pipeline,
            marker,
            clock,
            calendar: ExchangeCalendar::new(config.dst_rule),
            config,
            screening_time,
            state: RwLock::new(SchedulerState::Stopped),
            shutdown,
            task: Mutex::new(None),
            last_summary: RwLock::new(None),
        })
    }

    /// Current scheduler state
    pub async fn get_state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Exchange-local "now".
    pub fn now_local(&self) -> DateTime<FixedOffset> {
        self.calendar.to_exchange(self.clock.now())
    }

    /// Weekday, at or past the trigger time, and not already run today.
    pub fn should_trigger(&self, now: DateTime<FixedOffset>, last_run: Option<NaiveDate>) -> bool {
        let today = now.date_naive();
        is_weekday(today) && now.time() >= self.screening_time && last_run != Some(today)
    }

    /// Start the loop; a no-op when already running or disabled.
    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("Screening scheduler disabled, not starting");
            return;
        }

        {
            let mut state = self.state.write().await;
            if *state == SchedulerState::Running {
                debug!("Screening scheduler already running");
                return;
            }
            *state = SchedulerState::Running;
        }

        self.shutdown.send_replace(false);
        let shutdown = self.shutdown.subscribe();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run_loop(shutdown).await });
        *self.task.lock().await = Some(handle);

        info!(
            screening_time = %self.screening_time.format(ET_TIME_FORMAT),
            retry_policy = %self.config.retry_policy,
            "Screening scheduler started"
        );
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// An in-flight screening run finishes; only the next wake-up is
    /// prevented.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            if *state == SchedulerState::Stopped {
                return;
            }
            *state = SchedulerState::Stopped;
        }

        self.shutdown.send_replace(true);
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Screening scheduler task ended abnormally");
            }
        }
        info!("Screening scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let check_interval = Duration::from_secs(self.config.check_interval_secs.max(1));
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.tick().await {
                Ok(_) => check_interval,
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Scheduler iteration failed, backing off"
                    );
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }

        debug!("Screening scheduler loop exited");
    }

    /// One loop iteration: check the trigger and run screening if due.
    ///
    /// Errors returned here are iteration faults; the day is not recorded.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let now = self.now_local();
        let last_run = self
            .marker
            .last_run()
            .await
            .context("Failed to read last-run marker")?;

        if !self.should_trigger(now, last_run) {
            return Ok(TickOutcome::Skipped);
        }

        let today = now.date_naive();
        info!(
            now = %now.format(ET_DATETIME_FORMAT),
            "Daily screening triggered"
        );

        if let Err(e) = self.pipeline.refresh_daily_bars(None).await {
            warn!(error = %e, "Daily bar refresh failed, screening stored data");
        }

        let summary = self.pipeline.run_screening(None).await;

        let recorded = match self.config.retry_policy {
            RetryPolicy::AttemptOncePerDay => true,
            RetryPolicy::RetryUntilSuccess => summary.is_clean(),
        };
        if recorded {
            self.marker
                .record_run(today)
                .await
                .context("Failed to record last-run marker")?;
        } else {
            warn!(
                failed = ?summary.failed_algorithms,
                "Screening incomplete, will retry on next check"
            );
        }

        *self.last_summary.write().await = Some(summary.clone());
        Ok(TickOutcome::Ran { summary, recorded })
    }

    pub async fn status(&self) -> SchedulerStatus {
        let now = self.now_local();
        let last_run = match self.marker.last_run().await {
            Ok(last_run) => last_run,
            Err(e) => {
                warn!(error = %e, "Failed to read last-run marker");
                None
            }
        };
        let state = self.get_state().await;

        SchedulerStatus {
            running: state == SchedulerState::Running,
            state,
            screening_time: self.screening_time.format(ET_TIME_FORMAT).to_string(),
            last_run,
            current_time_et: now.format(ET_DATETIME_FORMAT).to_string(),
            next_run: self
                .calendar
                .next_run(now, self.screening_time)
                .format(ET_DATETIME_FORMAT)
                .to_string(),
            retry_policy: self.config.retry_policy,
            last_summary: self.last_summary.read().await.clone(),
        }
    }
}
