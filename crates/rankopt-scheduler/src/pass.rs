//! Per-job optimization pass.
//!
//! A pass runs, in order:
//! 1. rank lookup for the entity's topic, recorded with the check time
//! 2. `rank_after` backfill on the active version (same store write as 1)
//! 3. policy evaluation on the refreshed state
//! 4. when the policy says so: propose, apply externally, then commit
//!
//! The job is claimed in the store for the whole pass, so schedulers
//! sharing one store never run two passes for a job at once. Store locks
//! are only held inside individual store calls, never across a
//! collaborator call. A failure at any external step leaves the store as
//! the previous step wrote it; nothing from step 4 is persisted unless the
//! external apply succeeded.
//!
//! An optional time budget bounds the lookup and generation calls. Apply
//! and commit always run to completion once the apply has been sent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use rankopt_providers::{
    MetadataApplier, MetadataGenerator, ProviderError, RankLookup, RankOracle, RankingContext,
    DEFAULT_TOP_K,
};
use rankopt_storage::{CommitOptimization, PassClaim, RankCheckOutcome, Storage, StorageError};
use rankopt_types::{OptimizationJob, OptimizationVersion, TrackedEntity, TrackedKeyword};

use crate::clock::{Clock, SystemClock};
use crate::policy::{Decision, OptimizationPolicy};
use crate::registry::PassResult;
use crate::SchedulerError;

/// What one pass observed and did.
#[derive(Debug, Clone, Serialize)]
pub struct PassOutcome {
    pub job_id: String,
    pub entity_id: String,
    /// Raw lookup result of this pass
    pub lookup: RankLookup,
    /// Last known rank after the check
    pub current_rank: Option<u32>,
    /// Version whose `rank_after` this pass filled in
    pub backfilled_version: Option<u32>,
    pub decision: Decision,
    /// Version applied by this pass
    pub applied: Option<OptimizationVersion>,
}

impl PassOutcome {
    pub fn to_result(&self) -> PassResult {
        match &self.applied {
            Some(version) => PassResult::Optimized {
                rank: self.current_rank,
                version: version.version,
            },
            None => PassResult::Checked {
                rank: self.current_rank,
                decision: self.decision.label().to_string(),
            },
        }
    }
}

/// Runs passes for individual jobs against the store and collaborators.
///
/// Collaborators are explicit handles owned by whoever assembles the
/// scheduler, so tests substitute the fakes from `rankopt_providers::mock`.
pub struct JobScheduler {
    storage: Arc<Storage>,
    oracle: Arc<dyn RankOracle>,
    generator: Arc<dyn MetadataGenerator>,
    applier: Arc<dyn MetadataApplier>,
    credential: SecretString,
    policy: OptimizationPolicy,
    clock: Arc<dyn Clock>,
    top_k: u32,
}

impl JobScheduler {
    pub fn new(
        storage: Arc<Storage>,
        oracle: Arc<dyn RankOracle>,
        generator: Arc<dyn MetadataGenerator>,
        applier: Arc<dyn MetadataApplier>,
        credential: SecretString,
    ) -> Self {
        Self {
            storage,
            oracle,
            generator,
            applier,
            credential,
            policy: OptimizationPolicy::default(),
            clock: Arc::new(SystemClock),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_policy(mut self, policy: OptimizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Search depth for rank lookups; 0 falls back to the default.
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = if top_k == 0 { DEFAULT_TOP_K } else { top_k };
        self
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn policy(&self) -> &OptimizationPolicy {
        &self.policy
    }

    fn load(&self, job_id: &str) -> Result<(OptimizationJob, TrackedEntity), SchedulerError> {
        self.storage.load_job_and_entity(job_id).map_err(|e| match e {
            StorageError::NotFound(_) => SchedulerError::JobNotFound(job_id.to_string()),
            other => SchedulerError::Storage(other),
        })
    }

    /// Look the entity up and record the result (steps 1 and 2).
    async fn refresh_rank(
        &self,
        job: &OptimizationJob,
        entity: &TrackedEntity,
        deadline: Option<Instant>,
    ) -> Result<(RankLookup, RankCheckOutcome), SchedulerError> {
        let lookup = within(
            deadline,
            &job.job_id,
            "rank lookup",
            self.oracle.lookup(&entity.topic, &entity.entity_id, self.top_k),
        )
        .await?
        .map_err(|e| {
            warn!(
                job_id = %job.job_id,
                kind = e.kind(),
                error = %e,
                "Rank lookup failed"
            );
            SchedulerError::Provider(e)
        })?;

        let outcome =
            self.storage
                .record_rank_check(&job.job_id, lookup.position(), self.clock.now())?;

        debug!(
            job_id = %job.job_id,
            lookup = ?lookup,
            current_rank = ?outcome.job.current_rank,
            backfilled_version = ?outcome.backfilled_version,
            "Rank checked"
        );
        Ok((lookup, outcome))
    }

    /// Claim the job in the store for one pass.
    ///
    /// Fails with `PassInFlight` while any scheduler on the same store
    /// holds the claim.
    pub fn claim(&self, job_id: &str) -> Result<PassClaim, SchedulerError> {
        self.storage
            .try_claim_pass(job_id)
            .ok_or_else(|| SchedulerError::PassInFlight(job_id.to_string()))
    }

    /// Run one full pass for an active job.
    ///
    /// Fails with `PassInFlight` if another pass for the job has not
    /// finished, and with `JobInactive` for stopped jobs.
    pub async fn run_pass(&self, job_id: &str) -> Result<PassOutcome, SchedulerError> {
        let claim = self.claim(job_id)?;
        self.run_claimed_pass(&claim, None).await
    }

    /// Run a pass under a claim the caller already holds.
    ///
    /// With a `budget`, the rank lookup and the generation call must both
    /// finish before it runs out or the pass fails with `PassTimeout`
    /// having persisted at most the rank check. The apply and commit are
    /// never cut off.
    pub async fn run_claimed_pass(
        &self,
        claim: &PassClaim,
        budget: Option<Duration>,
    ) -> Result<PassOutcome, SchedulerError> {
        let job_id = claim.job_id();
        let deadline = budget.map(|b| Instant::now() + b);

        let (job, entity) = self.load(job_id)?;
        if !job.is_active() {
            return Err(SchedulerError::JobInactive(job_id.to_string()));
        }

        let (lookup, checked) = self.refresh_rank(&job, &entity, deadline).await?;
        let entity = checked.entity;

        let decision = self.policy.decide(
            entity.current_rank,
            entity.target_rank,
            entity.last_optimized_at,
            entity.optimization_count,
            self.clock.now(),
        );
        debug!(job_id = %job_id, decision = ?decision, "Policy evaluated");

        let applied = if decision.should_optimize() {
            Some(self.optimize(&checked.job, &entity, deadline).await?)
        } else {
            None
        };

        Ok(PassOutcome {
            job_id: job_id.to_string(),
            entity_id: entity.entity_id,
            lookup,
            current_rank: entity.current_rank,
            backfilled_version: checked.backfilled_version,
            decision,
            applied,
        })
    }

    /// Propose, apply, commit (step 4).
    async fn optimize(
        &self,
        job: &OptimizationJob,
        entity: &TrackedEntity,
        deadline: Option<Instant>,
    ) -> Result<OptimizationVersion, SchedulerError> {
        let context = RankingContext {
            topic: entity.topic.clone(),
            current_rank: entity.current_rank,
            target_rank: entity.target_rank,
        };

        let proposal = within(
            deadline,
            &job.job_id,
            "metadata generation",
            self.generator.propose(&entity.metadata, &context),
        )
        .await?
        .map_err(|e| {
            warn!(job_id = %job.job_id, error = %e, "Metadata generation failed");
            SchedulerError::Provider(e)
        })?;

        // Apply and commit run without a deadline

        if proposal.metadata.is_blank() {
            warn!(job_id = %job.job_id, "Generator returned an empty title");
            return Err(ProviderError::Generation("proposal has an empty title".to_string()).into());
        }

        self.applier
            .apply(&entity.entity_id, &proposal.metadata, &self.credential)
            .await
            .map_err(|e| {
                warn!(job_id = %job.job_id, kind = e.kind(), error = %e, "Metadata apply failed");
                SchedulerError::Provider(e)
            })?;

        let version = self
            .storage
            .commit_optimization(CommitOptimization {
                job_id: job.job_id.clone(),
                expected_count: entity.optimization_count,
                metadata: proposal.metadata,
                reasoning: proposal.reasoning,
                applied_at: self.clock.now(),
                cooldown: self.policy.cooldown(),
            })
            .map_err(|e| {
                if matches!(e, StorageError::Conflict(_)) {
                    warn!(
                        job_id = %job.job_id,
                        entity_id = %entity.entity_id,
                        "Applied metadata lost the commit race; newer version already recorded"
                    );
                }
                SchedulerError::Storage(e)
            })?;

        info!(
            job_id = %job.job_id,
            entity_id = %entity.entity_id,
            version = version.version,
            rank_before = ?version.rank_before,
            reasoning = version.reasoning.as_deref().unwrap_or(""),
            "Applied optimized metadata"
        );
        Ok(version)
    }

    /// Forced rank check for one job (steps 1 and 2 only).
    ///
    /// Works for stopped jobs too; it never optimizes.
    pub async fn check_rank(&self, job_id: &str) -> Result<RankCheckOutcome, SchedulerError> {
        let (job, entity) = self.load(job_id)?;
        let (_, outcome) = self.refresh_rank(&job, &entity, None).await?;
        Ok(outcome)
    }

    /// Look up a supplementary keyword and record the result.
    ///
    /// "Not found" clears the keyword's current rank.
    pub async fn check_keyword_rank(
        &self,
        entity_id: &str,
        keyword: &str,
    ) -> Result<TrackedKeyword, SchedulerError> {
        if self.storage.get_entity(entity_id)?.is_none() {
            return Err(SchedulerError::EntityNotFound(entity_id.to_string()));
        }
        let tracked = self.storage.get_keyword(entity_id, keyword)?.ok_or_else(|| {
            StorageError::NotFound(format!("keyword {:?} for {}", keyword, entity_id))
        })?;

        let lookup = self
            .oracle
            .lookup(&tracked.keyword, entity_id, self.top_k)
            .await?;

        let updated = self.storage.record_keyword_check(
            entity_id,
            &tracked.keyword,
            lookup.position(),
            self.clock.now(),
        )?;

        debug!(
            entity_id = %entity_id,
            keyword = %updated.keyword,
            rank = ?updated.current_rank,
            "Keyword rank checked"
        );
        Ok(updated)
    }
}

/// Await `fut`, failing with `PassTimeout` once `deadline` passes.
async fn within<F: Future>(
    deadline: Option<Instant>,
    job_id: &str,
    step: &'static str,
    fut: F,
) -> Result<F::Output, SchedulerError> {
    let Some(deadline) = deadline else {
        return Ok(fut.await);
    };
    tokio::time::timeout_at(deadline, fut).await.map_err(|_| {
        warn!(job_id = %job_id, step, "Pass exceeded its time budget");
        SchedulerError::PassTimeout(job_id.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rankopt_providers::{MockGenerator, RecordingApplier, ScriptedRankOracle};
    use rankopt_storage::StartJob;
    use rankopt_types::Metadata;
    use tempfile::TempDir;

    use crate::clock::ManualClock;

    struct Harness {
        scheduler: JobScheduler,
        oracle: Arc<ScriptedRankOracle>,
        applier: Arc<RecordingApplier>,
        clock: Arc<ManualClock>,
        _temp: TempDir,
    }

    fn harness() -> Harness {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let oracle = Arc::new(ScriptedRankOracle::new());
        let applier = Arc::new(RecordingApplier::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ));

        let scheduler = JobScheduler::new(
            storage,
            oracle.clone(),
            Arc::new(MockGenerator::new()),
            applier.clone(),
            SecretString::from("token".to_string()),
        )
        .with_clock(clock.clone());

        Harness {
            scheduler,
            oracle,
            applier,
            clock,
            _temp: temp,
        }
    }

    fn track(h: &Harness, entity_id: &str) -> String {
        let (job, _) = h
            .scheduler
            .storage()
            .start_job(
                StartJob::new(entity_id)
                    .with_topic("rust async")
                    .with_metadata(Metadata::new("Intro", vec![], "")),
            )
            .unwrap();
        job.job_id
    }

    #[tokio::test]
    async fn test_pass_optimizes_when_below_target() {
        let h = harness();
        let job_id = track(&h, "vid1");
        h.oracle.push_rank("rust async", 30);

        let outcome = h.scheduler.run_pass(&job_id).await.unwrap();
        assert_eq!(outcome.current_rank, Some(30));
        assert_eq!(outcome.decision, Decision::Optimize);
        let version = outcome.applied.unwrap();
        assert_eq!(version.version, 1);
        assert_eq!(version.rank_before, Some(30));
        assert!(version.reasoning.is_some());
        assert_eq!(h.applier.applied_count(), 1);
        assert_eq!(h.oracle.calls()[0].2, DEFAULT_TOP_K);
    }

    #[tokio::test]
    async fn test_pass_respects_target() {
        let h = harness();
        let job_id = track(&h, "vid1");
        h.oracle.push_rank("rust async", 2);

        let outcome = h.scheduler.run_pass(&job_id).await.unwrap();
        assert_eq!(
            outcome.decision,
            Decision::TargetMet {
                rank: 2,
                target_rank: 5
            }
        );
        assert!(outcome.applied.is_none());
        assert_eq!(h.applier.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_second_pass_backfills_and_cools_down() {
        let h = harness();
        let job_id = track(&h, "vid1");
        h.oracle.push_rank("rust async", 30).push_rank("rust async", 18);

        h.scheduler.run_pass(&job_id).await.unwrap();
        h.clock.advance(Duration::hours(1));

        let outcome = h.scheduler.run_pass(&job_id).await.unwrap();
        assert_eq!(outcome.backfilled_version, Some(1));
        assert!(matches!(outcome.decision, Decision::CoolingDown { .. }));
        assert!(outcome.applied.is_none());

        h.clock.advance(Duration::hours(24));
        let outcome = h.scheduler.run_pass(&job_id).await.unwrap();
        assert_eq!(outcome.applied.map(|v| v.version), Some(2));
    }

    #[tokio::test]
    async fn test_stopped_job_is_rejected() {
        let h = harness();
        let job_id = track(&h, "vid1");
        h.scheduler.storage().stop_job(&job_id).unwrap();

        let result = h.scheduler.run_pass(&job_id).await;
        assert!(matches!(result, Err(SchedulerError::JobInactive(_))));
        assert_eq!(h.oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let h = harness();
        let result = h.scheduler.run_pass("missing").await;
        assert!(matches!(result, Err(SchedulerError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_oracle_failure_leaves_state_untouched() {
        let h = harness();
        let job_id = track(&h, "vid1");
        h.oracle
            .push_error("rust async", ProviderError::Transient("quota".into()));

        let err = h.scheduler.run_pass(&job_id).await.unwrap_err();
        assert!(err.is_retryable());

        let job = h.scheduler.storage().get_job(&job_id).unwrap().unwrap();
        assert!(job.last_rank_check_at.is_none());
        assert!(!h.scheduler.storage().is_pass_claimed(&job_id));
    }

    #[tokio::test]
    async fn test_claim_held_elsewhere_skips_pass() {
        let h = harness();
        let job_id = track(&h, "vid1");

        let claim = h.scheduler.storage().try_claim_pass(&job_id).unwrap();
        let result = h.scheduler.run_pass(&job_id).await;
        assert!(matches!(result, Err(SchedulerError::PassInFlight(_))));
        assert_eq!(h.oracle.call_count(), 0);

        drop(claim);
        h.oracle.push_rank("rust async", 3);
        assert!(h.scheduler.run_pass(&job_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_budget_bounds_rank_lookup() {
        let h = harness();
        let job_id = track(&h, "vid1");
        let slow = JobScheduler::new(
            h.scheduler.storage().clone(),
            Arc::new(ScriptedRankOracle::new().with_delay(std::time::Duration::from_secs(5))),
            Arc::new(MockGenerator::new()),
            h.applier.clone(),
            SecretString::from("token".to_string()),
        );

        let claim = slow.claim(&job_id).unwrap();
        let result = slow
            .run_claimed_pass(&claim, Some(std::time::Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(SchedulerError::PassTimeout(_))));

        let job = slow.storage().get_job(&job_id).unwrap().unwrap();
        assert!(job.last_rank_check_at.is_none());
        assert_eq!(h.applier.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_forced_check_on_stopped_job() {
        let h = harness();
        let job_id = track(&h, "vid1");
        h.scheduler.storage().stop_job(&job_id).unwrap();
        h.oracle.push_rank("rust async", 9);

        let outcome = h.scheduler.check_rank(&job_id).await.unwrap();
        assert_eq!(outcome.job.current_rank, Some(9));
        assert_eq!(h.applier.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_keyword_check() {
        let h = harness();
        track(&h, "vid1");
        h.scheduler.storage().add_keyword("vid1", "Tokio Tips").unwrap();
        h.oracle.push_rank("tokio tips", 4).push_not_found("tokio tips");

        let kw = h.scheduler.check_keyword_rank("vid1", "tokio tips").await.unwrap();
        assert_eq!(kw.current_rank, Some(4));

        let kw = h.scheduler.check_keyword_rank("vid1", "TOKIO TIPS").await.unwrap();
        assert_eq!(kw.current_rank, None);

        let calls = h.oracle.calls();
        assert_eq!(calls[0].0, "tokio tips");
        assert_eq!(calls[0].1, "vid1");

        let missing = h.scheduler.check_keyword_rank("vid1", "nope").await;
        assert!(matches!(
            missing,
            Err(SchedulerError::Storage(StorageError::NotFound(_)))
        ));
        let missing = h.scheduler.check_keyword_rank("other", "tokio tips").await;
        assert!(matches!(missing, Err(SchedulerError::EntityNotFound(_))));
    }
}
