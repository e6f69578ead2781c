//! Scheduler service: drives scheduling cycles from a trigger.
//!
//! Trigger modes:
//! - interval: fixed period between cycle starts, cycles never overlap
//! - cron: timezone-aware cron via tokio-cron-scheduler
//! - manual: no timer, the embedder calls [`SchedulerService::trigger_now`]
//!
//! In every mode `run_on_start` fires one cycle right after `start()`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono_tz::Tz;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler as CronScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use rankopt_types::TriggerMode;

use crate::cycle::{run_cycle, CycleOptions};
use crate::pass::JobScheduler;
use crate::registry::{CycleSummary, PassRegistry};
use crate::{SchedulerConfig, SchedulerError};

const CYCLE_JOB_NAME: &str = "optimization-cycle";

/// Validate a cron expression.
///
/// The expression uses the 6-field format:
/// second minute hour day-of-month month day-of-week.
///
/// ```
/// use rankopt_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 */4 * * *").is_ok());
/// assert!(validate_cron_expression("every four hours").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

async fn run_logged_cycle(
    passes: Arc<JobScheduler>,
    registry: Arc<PassRegistry>,
    options: CycleOptions,
    token: CancellationToken,
) {
    if let Err(e) = run_cycle(&passes, &registry, &options, &token).await {
        warn!(error = %e, "Scheduling cycle failed");
    }
}

/// Owns the trigger and the background tasks that run cycles.
pub struct SchedulerService {
    scheduler: CronScheduler,
    config: SchedulerConfig,
    passes: Arc<JobScheduler>,
    registry: Arc<PassRegistry>,
    shutdown_token: CancellationToken,
    tasks: TaskTracker,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create the service. Nothing runs until `start()`.
    pub async fn new(
        config: SchedulerConfig,
        passes: Arc<JobScheduler>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        if config.trigger == TriggerMode::Cron {
            validate_cron_expression(&config.cron)?;
        }

        let scheduler = CronScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            passes,
            registry: Arc::new(PassRegistry::new()),
            shutdown_token: CancellationToken::new(),
            tasks: TaskTracker::new(),
            is_running: AtomicBool::new(false),
        })
    }

    fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            max_concurrent_passes: self.config.max_concurrent_passes,
            jitter: self.config.jitter(),
            pass_timeout: self.config.pass_timeout(),
        }
    }

    /// Start the configured trigger.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the scheduler is already started.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        if let Err(e) = self.start_trigger().await {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!(trigger = ?self.config.trigger, "Scheduler started");
        Ok(())
    }

    async fn start_trigger(&self) -> Result<(), SchedulerError> {
        match self.config.trigger {
            TriggerMode::Interval => self.spawn_interval_loop(),
            TriggerMode::Cron => {
                let passes = self.passes.clone();
                let registry = self.registry.clone();
                let options = self.cycle_options();
                let tasks = self.tasks.clone();
                self.add_cron_job(CYCLE_JOB_NAME, &self.config.cron, None, move |token| {
                    // Tracked so shutdown drains cron-started cycles too
                    let cycle = tasks.spawn(run_logged_cycle(
                        passes.clone(),
                        registry.clone(),
                        options.clone(),
                        token,
                    ));
                    async move {
                        if let Err(e) = cycle.await {
                            warn!(error = %e, "Cron cycle task failed");
                        }
                    }
                })
                .await?;
                self.spawn_startup_cycle();
            }
            TriggerMode::Manual => self.spawn_startup_cycle(),
        }

        self.scheduler.start().await?;
        Ok(())
    }

    fn spawn_startup_cycle(&self) {
        if !self.config.run_on_start {
            return;
        }
        self.tasks.spawn(run_logged_cycle(
            self.passes.clone(),
            self.registry.clone(),
            self.cycle_options(),
            self.shutdown_token.clone(),
        ));
    }

    fn spawn_interval_loop(&self) {
        let period = self.config.interval();
        let first = if self.config.run_on_start {
            Instant::now()
        } else {
            Instant::now() + period
        };

        let passes = self.passes.clone();
        let registry = self.registry.clone();
        let options = self.cycle_options();
        let token = self.shutdown_token.clone();

        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        run_logged_cycle(
                            passes.clone(),
                            registry.clone(),
                            options.clone(),
                            token.clone(),
                        )
                        .await;
                    }
                }
            }
            info!("Interval trigger stopped");
        });
    }

    /// Run one cycle now and wait for it.
    ///
    /// Usable in every trigger mode, started or not. Passes already in
    /// flight from a timer-driven cycle are skipped.
    pub async fn trigger_now(&self) -> Result<CycleSummary, SchedulerError> {
        run_cycle(
            &self.passes,
            &self.registry,
            &self.cycle_options(),
            &self.shutdown_token,
        )
        .await
    }

    /// Shutdown the scheduler gracefully.
    ///
    /// Cancels the trigger, lets in-flight passes finish for up to
    /// `shutdown_timeout_secs`, then stops the cron scheduler. Passes not
    /// yet started are skipped.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if the scheduler is not started.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();
        self.tasks.close();

        let grace = std::time::Duration::from_secs(self.config.shutdown_timeout_secs);
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            warn!(
                in_flight = self.passes.storage().claimed_pass_count(),
                "Shutdown grace period elapsed with passes still running"
            );
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Pass and cycle status.
    pub fn registry(&self) -> Arc<PassRegistry> {
        self.registry.clone()
    }

    pub fn passes(&self) -> &Arc<JobScheduler> {
        &self.passes
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Add a cron job with timezone-aware scheduling.
    ///
    /// The job receives a clone of the shutdown token.
    pub async fn add_cron_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tz: Tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };

        validate_cron_expression(cron_expr)?;

        let job_name = name.to_string();
        let shutdown_token = self.shutdown_token.clone();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let token = shutdown_token.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                if token.is_cancelled() {
                    return;
                }
                info!(job = %name, "Cron trigger fired");
                let start = std::time::Instant::now();
                job_fn(token).await;
                info!(job = %name, duration_ms = start.elapsed().as_millis(), "Cron job finished");
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Cron job registered");

        Ok(uuid)
    }

    /// Parse a timezone string into a chrono_tz::Tz.
    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }
}
