//! One scheduling cycle: a pass for every active job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rankopt_types::{JobStatus, OptimizationJob};

use crate::jitter::{with_jitter, JitterConfig};
use crate::pass::JobScheduler;
use crate::registry::{CycleSummary, PassRegistry, PassResult};
use crate::SchedulerError;

/// Limits applied to the passes of one cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub max_concurrent_passes: usize,
    pub jitter: JitterConfig,
    /// Budget for the rank lookup and generation calls of a pass. Apply and
    /// commit are never cut off. `None` waits as long as the collaborators
    /// take.
    pub pass_timeout: Option<Duration>,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            max_concurrent_passes: 8,
            jitter: JitterConfig::none(),
            pass_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Run a pass for every job that is active at enumeration time.
///
/// Jobs whose previous pass is still in flight are skipped. A failing pass
/// is logged and counted; it never fails the cycle. Only a failure to list
/// the jobs is returned as an error.
pub async fn run_cycle(
    passes: &Arc<JobScheduler>,
    registry: &PassRegistry,
    options: &CycleOptions,
    cancel: &CancellationToken,
) -> Result<CycleSummary, SchedulerError> {
    let started_at = Utc::now();
    let start = Instant::now();

    let jobs = passes.storage().list_jobs(Some(JobStatus::Active))?;
    info!(jobs = jobs.len(), "Scheduling cycle started");

    let results: Vec<PassResult> = stream::iter(jobs.iter())
        .map(|job| run_one(passes, registry, options, cancel, job))
        .buffer_unordered(options.max_concurrent_passes.max(1))
        .collect()
        .await;

    let mut summary = CycleSummary {
        started_at: Some(started_at),
        jobs: jobs.len(),
        ..Default::default()
    };
    for result in &results {
        summary.tally(result);
    }
    summary.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        jobs = summary.jobs,
        checked = summary.checked,
        optimized = summary.optimized,
        skipped = summary.skipped,
        failed = summary.failed,
        duration_ms = summary.duration_ms,
        "Scheduling cycle complete"
    );
    registry.record_cycle(summary.clone());
    Ok(summary)
}

async fn run_one(
    passes: &JobScheduler,
    registry: &PassRegistry,
    options: &CycleOptions,
    cancel: &CancellationToken,
    job: &OptimizationJob,
) -> PassResult {
    if cancel.is_cancelled() {
        return PassResult::Skipped("shutting down".to_string());
    }
    // Held until the pass is recorded, so no other scheduler on the store
    // can start this job in the meantime
    let claim = match passes.claim(&job.job_id) {
        Ok(claim) => claim,
        Err(_) => {
            info!(job_id = %job.job_id, "Previous pass still running, skipping");
            return PassResult::Skipped("pass in flight".to_string());
        }
    };

    let start = Instant::now();

    let result = with_jitter(&options.jitter, async {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        registry.record_start(&job.job_id, &job.entity_id);
        passes
            .run_claimed_pass(&claim, options.pass_timeout)
            .await
            .map(Some)
    })
    .await;

    let result = match result {
        Ok(Some(outcome)) => outcome.to_result(),
        Ok(None) => return PassResult::Skipped("shutting down".to_string()),
        // Stopped between enumeration and pass start
        Err(SchedulerError::JobInactive(_)) => PassResult::Skipped("job stopped".to_string()),
        Err(e) => {
            warn!(
                job_id = %job.job_id,
                entity_id = %job.entity_id,
                retryable = e.is_retryable(),
                error = %e,
                "Pass failed"
            );
            PassResult::Failed(e.to_string())
        }
    };

    registry.record_complete(
        &job.job_id,
        result.clone(),
        start.elapsed().as_millis() as u64,
    );
    drop(claim);
    result
}
