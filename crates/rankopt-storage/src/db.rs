//! RocksDB wrapper for the rankopt job store.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Job lifecycle writes (start, reactivate, stop, untrack)
//! - Rank check recording with rank-after backfill
//! - Optimization commits that flip the active version atomically
//! - Newest-first history reads

use chrono::{DateTime, Duration, Utc};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use rankopt_types::{
    normalize_keyword, validate_entity_id, JobStatus, KeywordRankSample, Metadata,
    OptimizationJob, OptimizationVersion, RankSample, TrackedEntity, TrackedKeyword,
};

use crate::claims::{PassClaim, PassClaims};
use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_ACTIVE_VERSIONS, CF_ENTITIES, CF_JOBS, CF_JOB_INDEX,
    CF_KEYWORDS, CF_KEYWORD_SAMPLES, CF_RANK_SAMPLES, CF_VERSIONS,
};
use crate::error::StorageError;
use crate::keys::{
    prefix_upper_bound, ActiveVersionKey, EntityKey, JobIndexKey, JobKey, KeywordKey,
    KeywordSampleKey, RankSampleKey, VersionKey,
};
use crate::locks::{JobLocks, LockKey};

/// Request to start (or restart) tracking an entity.
///
/// `topic` and `metadata` are required the first time an entity is seen and
/// ignored for metadata on reactivation; the applied metadata is owned by
/// the version history from then on.
#[derive(Debug, Clone, Default)]
pub struct StartJob {
    pub entity_id: String,
    pub topic: Option<String>,
    pub metadata: Option<Metadata>,
    pub target_rank: Option<u32>,
    pub current_rank: Option<u32>,
}

impl StartJob {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_target_rank(mut self, target_rank: u32) -> Self {
        self.target_rank = Some(target_rank);
        self
    }

    pub fn with_current_rank(mut self, current_rank: u32) -> Self {
        self.current_rank = Some(current_rank);
        self
    }
}

/// State after a rank check was recorded.
#[derive(Debug, Clone)]
pub struct RankCheckOutcome {
    pub job: OptimizationJob,
    pub entity: TrackedEntity,
    /// Sample appended by this check, `None` when the entity was not found
    pub sample: Option<RankSample>,
    /// Version whose `rank_after` this check resolved
    pub backfilled_version: Option<u32>,
}

/// A successfully applied optimization, ready to be recorded.
#[derive(Debug, Clone)]
pub struct CommitOptimization {
    pub job_id: String,
    /// `optimization_count` the caller observed when it decided to optimize
    pub expected_count: u32,
    pub metadata: Metadata,
    pub reasoning: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub cooldown: Duration,
}

/// Main storage interface for rankopt
pub struct Storage {
    db: DB,
    locks: JobLocks,
    claims: PassClaims,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            locks: JobLocks::new(),
            claims: PassClaims::new(),
        })
    }

    /// Claim a job for one scheduler pass.
    ///
    /// Every scheduler sharing this store goes through the same claims, so
    /// two passes for one job never both reach the policy check. Returns
    /// `None` while another pass holds the job.
    pub fn try_claim_pass(&self, job_id: &str) -> Option<PassClaim> {
        let claim = self.claims.try_claim(job_id);
        if claim.is_none() {
            debug!(job_id = %job_id, "Pass already in flight");
        }
        claim
    }

    pub fn is_pass_claimed(&self, job_id: &str) -> bool {
        self.claims.is_claimed(job_id)
    }

    /// Number of jobs with a pass in flight.
    pub fn claimed_pass_count(&self) -> usize {
        self.claims.count()
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Forward scan of every (key, value) under a prefix.
    #[allow(clippy::type_complexity)]
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StorageError> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key, value));
        }
        Ok(results)
    }

    /// Reverse scan under a prefix, newest (largest key) first.
    #[allow(clippy::type_complexity)]
    fn scan_prefix_rev(
        &self,
        cf_name: &str,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StorageError> {
        let cf = self.cf(cf_name)?;
        let upper = prefix_upper_bound(prefix);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse));

        let limit = limit.unwrap_or(usize::MAX);
        let mut results = Vec::new();
        for item in iter {
            if results.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                if &key[..] < prefix {
                    break;
                }
                continue;
            }
            results.push((key, value));
        }
        Ok(results)
    }

    // ==================== Job Lifecycle ====================

    /// Start tracking an entity, or reactivate its existing job.
    ///
    /// Returns the job and whether it was newly created. Reactivation keeps
    /// the full version and rank history and only overwrites baseline and
    /// current rank when a fresh rank is supplied.
    pub fn start_job(&self, request: StartJob) -> Result<(OptimizationJob, bool), StorageError> {
        validate_entity_id(&request.entity_id)?;
        if request.target_rank == Some(0) || request.current_rank == Some(0) {
            return Err(StorageError::InvalidInput(
                "ranks are 1-based; 0 is not a valid rank".to_string(),
            ));
        }

        if let Some(job_id) = self.job_id_for_entity(&request.entity_id)? {
            let job = self
                .locks
                .with_lock(LockKey::job(&job_id), || self.reactivate(&job_id, &request))?;
            return Ok((job, false));
        }

        // Lock order is always entity before job.
        self.locks
            .with_lock(LockKey::entity(&request.entity_id), || {
                match self.job_id_for_entity(&request.entity_id)? {
                    Some(job_id) => self
                        .locks
                        .with_lock(LockKey::job(&job_id), || self.reactivate(&job_id, &request))
                        .map(|job| (job, false)),
                    None => self.create_job(&request).map(|job| (job, true)),
                }
            })
    }

    fn create_job(&self, request: &StartJob) -> Result<OptimizationJob, StorageError> {
        let (topic, metadata) = match (&request.topic, &request.metadata) {
            (Some(topic), Some(metadata)) if !topic.trim().is_empty() => (topic, metadata),
            _ => {
                return Err(StorageError::InvalidInput(format!(
                    "topic and metadata are required to start tracking {}",
                    request.entity_id
                )))
            }
        };

        let mut entity = TrackedEntity::new(&request.entity_id, topic.trim(), metadata.clone());
        if let Some(target_rank) = request.target_rank {
            entity = entity.with_target_rank(target_rank);
        }
        entity.current_rank = request.current_rank;

        let job = OptimizationJob::new(&request.entity_id, request.current_rank);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_ENTITIES)?,
            EntityKey(&entity.entity_id).to_bytes(),
            entity.to_bytes()?,
        );
        batch.put_cf(self.cf(CF_JOBS)?, JobKey(&job.job_id).to_bytes(), job.to_bytes()?);
        batch.put_cf(
            self.cf(CF_JOB_INDEX)?,
            JobIndexKey(&entity.entity_id).to_bytes(),
            job.job_id.as_bytes(),
        );
        self.db.write(batch)?;

        info!(
            job_id = %job.job_id,
            entity_id = %entity.entity_id,
            baseline_rank = ?job.baseline_rank,
            target_rank = entity.target_rank,
            "Created optimization job"
        );
        Ok(job)
    }

    fn reactivate(&self, job_id: &str, request: &StartJob) -> Result<OptimizationJob, StorageError> {
        let (mut job, mut entity) = self.load_job_and_entity(job_id)?;

        job.status = JobStatus::Active;
        if let Some(rank) = request.current_rank {
            job.baseline_rank = Some(rank);
            job.current_rank = Some(rank);
            entity.current_rank = Some(rank);
        }
        if let Some(target_rank) = request.target_rank {
            entity.target_rank = target_rank;
        }
        if let Some(topic) = request.topic.as_deref().map(str::trim) {
            if !topic.is_empty() {
                entity.topic = topic.to_string();
            }
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_JOBS)?, JobKey(job_id).to_bytes(), job.to_bytes()?);
        batch.put_cf(
            self.cf(CF_ENTITIES)?,
            EntityKey(&entity.entity_id).to_bytes(),
            entity.to_bytes()?,
        );
        self.db.write(batch)?;

        info!(job_id = %job_id, baseline_rank = ?job.baseline_rank, "Reactivated optimization job");
        Ok(job)
    }

    /// Stop a job. The scheduler skips it from the next cycle on; history is kept.
    pub fn stop_job(&self, job_id: &str) -> Result<OptimizationJob, StorageError> {
        self.locks.with_lock(LockKey::job(job_id), || {
            let mut job = self
                .get_job(job_id)?
                .ok_or_else(|| StorageError::NotFound(format!("job {}", job_id)))?;

            job.status = JobStatus::Stopped;
            self.db
                .put_cf(self.cf(CF_JOBS)?, JobKey(job_id).to_bytes(), job.to_bytes()?)?;

            info!(job_id = %job_id, "Stopped optimization job");
            Ok(job)
        })
    }

    /// Delete an entity with its job, histories, and keywords.
    ///
    /// Returns false when the entity was not tracked.
    pub fn untrack_entity(&self, entity_id: &str) -> Result<bool, StorageError> {
        validate_entity_id(entity_id)?;

        let (removed, job_id) = self.locks.with_lock(LockKey::entity(entity_id), || {
            match self.job_id_for_entity(entity_id)? {
                Some(job_id) => {
                    let removed = self.locks.with_lock(LockKey::job(&job_id), || {
                        self.delete_entity_records(entity_id, Some(&job_id))
                    })?;
                    Ok((removed, Some(job_id)))
                }
                None => Ok((self.delete_entity_records(entity_id, None)?, None)),
            }
        })?;

        if let Some(job_id) = &job_id {
            self.locks.forget(&LockKey::job(job_id));
        }
        self.locks.forget(&LockKey::entity(entity_id));
        Ok(removed)
    }

    fn delete_entity_records(
        &self,
        entity_id: &str,
        job_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let existed = self.get_entity(entity_id)?.is_some();
        let mut batch = WriteBatch::default();

        batch.delete_cf(self.cf(CF_ENTITIES)?, EntityKey(entity_id).to_bytes());
        batch.delete_cf(self.cf(CF_JOB_INDEX)?, JobIndexKey(entity_id).to_bytes());

        if let Some(job_id) = job_id {
            batch.delete_cf(self.cf(CF_JOBS)?, JobKey(job_id).to_bytes());
            batch.delete_cf(
                self.cf(CF_ACTIVE_VERSIONS)?,
                ActiveVersionKey(job_id).to_bytes(),
            );
            for (key, _) in self.scan_prefix(CF_VERSIONS, &VersionKey::prefix(job_id))? {
                batch.delete_cf(self.cf(CF_VERSIONS)?, key);
            }
            for (key, _) in self.scan_prefix(CF_RANK_SAMPLES, &RankSampleKey::prefix(job_id))? {
                batch.delete_cf(self.cf(CF_RANK_SAMPLES)?, key);
            }
        }

        for keyword in self.list_keywords(entity_id)? {
            batch.delete_cf(
                self.cf(CF_KEYWORDS)?,
                KeywordKey::new(entity_id, &keyword.keyword).to_bytes(),
            );
            for (key, _) in self.scan_prefix(
                CF_KEYWORD_SAMPLES,
                &KeywordSampleKey::prefix(&keyword.keyword_id),
            )? {
                batch.delete_cf(self.cf(CF_KEYWORD_SAMPLES)?, key);
            }
        }

        self.db.write(batch)?;

        info!(entity_id = %entity_id, job_id = ?job_id, "Untracked entity");
        Ok(existed)
    }

    // ==================== Reads ====================

    /// Get a job by id
    pub fn get_job(&self, job_id: &str) -> Result<Option<OptimizationJob>, StorageError> {
        self.get_json(CF_JOBS, &JobKey(job_id).to_bytes())
    }

    /// Get an entity by its external id
    pub fn get_entity(&self, entity_id: &str) -> Result<Option<TrackedEntity>, StorageError> {
        self.get_json(CF_ENTITIES, &EntityKey(entity_id).to_bytes())
    }

    fn job_id_for_entity(&self, entity_id: &str) -> Result<Option<String>, StorageError> {
        let cf = self.cf(CF_JOB_INDEX)?;
        match self.db.get_cf(cf, JobIndexKey(entity_id).to_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Key(format!("Invalid job id: {}", e))),
            None => Ok(None),
        }
    }

    /// Get the job owned by an entity
    pub fn get_job_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Option<OptimizationJob>, StorageError> {
        match self.job_id_for_entity(entity_id)? {
            Some(job_id) => self.get_job(&job_id),
            None => Ok(None),
        }
    }

    /// Load a job together with the entity it owns.
    pub fn load_job_and_entity(
        &self,
        job_id: &str,
    ) -> Result<(OptimizationJob, TrackedEntity), StorageError> {
        let job = self
            .get_job(job_id)?
            .ok_or_else(|| StorageError::NotFound(format!("job {}", job_id)))?;
        let entity = self
            .get_entity(&job.entity_id)?
            .ok_or_else(|| StorageError::NotFound(format!("entity {}", job.entity_id)))?;
        Ok((job, entity))
    }

    /// List jobs in creation order, optionally filtered by status.
    pub fn list_jobs(
        &self,
        status: Option<JobStatus>,
    ) -> Result<Vec<OptimizationJob>, StorageError> {
        let mut jobs = Vec::new();
        for (_, value) in self.scan_prefix(CF_JOBS, b"job:")? {
            let job = OptimizationJob::from_bytes(&value)?;
            if status.map_or(true, |s| s == job.status) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    // ==================== Rank Checks ====================

    /// Record the result of a rank lookup for a job.
    ///
    /// A resolved rank updates job and entity rank, appends a sample, and
    /// fills `rank_after` on the active version if it is still open. `None`
    /// (not found in top-K) keeps the last known rank and only stamps the
    /// check time.
    pub fn record_rank_check(
        &self,
        job_id: &str,
        rank: Option<u32>,
        observed_at: DateTime<Utc>,
    ) -> Result<RankCheckOutcome, StorageError> {
        if rank == Some(0) {
            return Err(StorageError::InvalidInput("rank 0 is not valid".to_string()));
        }

        self.locks.with_lock(LockKey::job(job_id), || {
            let (mut job, mut entity) = self.load_job_and_entity(job_id)?;
            let mut batch = WriteBatch::default();
            let mut sample = None;
            let mut backfilled_version = None;

            job.last_rank_check_at = Some(observed_at);

            if let Some(rank) = rank {
                job.current_rank = Some(rank);
                entity.current_rank = Some(rank);

                let new_sample = RankSample::new(job_id, rank, observed_at);
                batch.put_cf(
                    self.cf(CF_RANK_SAMPLES)?,
                    RankSampleKey::new(job_id, observed_at.timestamp_millis()).to_bytes(),
                    new_sample.to_bytes()?,
                );
                batch.put_cf(
                    self.cf(CF_ENTITIES)?,
                    EntityKey(&entity.entity_id).to_bytes(),
                    entity.to_bytes()?,
                );

                if let Some(mut active) = self.active_version(job_id)? {
                    if active.awaiting_rank_after() {
                        active.rank_after = Some(rank);
                        batch.put_cf(
                            self.cf(CF_VERSIONS)?,
                            VersionKey::new(job_id, active.version).to_bytes(),
                            active.to_bytes()?,
                        );
                        backfilled_version = Some(active.version);
                    }
                }
                sample = Some(new_sample);
            }

            batch.put_cf(self.cf(CF_JOBS)?, JobKey(job_id).to_bytes(), job.to_bytes()?);
            self.db.write(batch)?;

            debug!(
                job_id = %job_id,
                rank = ?rank,
                backfilled_version = ?backfilled_version,
                "Recorded rank check"
            );

            Ok(RankCheckOutcome {
                job,
                entity,
                sample,
                backfilled_version,
            })
        })
    }

    /// Rank samples for a job, newest first.
    pub fn rank_history(
        &self,
        job_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RankSample>, StorageError> {
        self.scan_prefix_rev(CF_RANK_SAMPLES, &RankSampleKey::prefix(job_id), limit)?
            .into_iter()
            .map(|(_, value)| RankSample::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    // ==================== Versions ====================

    /// Record an externally applied optimization as the new active version.
    ///
    /// In one atomic batch under the job lock: deactivates the previous
    /// version, appends version `max + 1` with `rank_before` set to the
    /// job's current rank, moves the active pointer, copies the metadata
    /// onto the entity, advances `optimization_count`, and stamps
    /// `last_optimized_at` / `next_optimization_at`.
    ///
    /// Fails with `Conflict` without writing anything when another commit
    /// advanced `optimization_count` past `expected_count`.
    pub fn commit_optimization(
        &self,
        commit: CommitOptimization,
    ) -> Result<OptimizationVersion, StorageError> {
        if commit.metadata.is_blank() {
            return Err(StorageError::InvalidInput(
                "optimized metadata has an empty title".to_string(),
            ));
        }

        let job_id = commit.job_id.as_str();
        self.locks.with_lock(LockKey::job(job_id), || {
            let (mut job, mut entity) = self.load_job_and_entity(job_id)?;

            if entity.optimization_count != commit.expected_count {
                return Err(StorageError::Conflict(format!(
                    "job {} optimization_count is {}, expected {}",
                    job_id, entity.optimization_count, commit.expected_count
                )));
            }

            let versions_cf = self.cf(CF_VERSIONS)?;
            let mut batch = WriteBatch::default();

            if let Some(mut previous) = self.active_version(job_id)? {
                previous.is_active = false;
                batch.put_cf(
                    versions_cf,
                    VersionKey::new(job_id, previous.version).to_bytes(),
                    previous.to_bytes()?,
                );
            }

            let next = self.max_version(job_id)? + 1;
            let version = OptimizationVersion::new(
                job_id,
                next,
                commit.metadata.clone(),
                job.current_rank,
                commit.applied_at,
            )
            .with_reasoning(commit.reasoning.clone());

            batch.put_cf(
                versions_cf,
                VersionKey::new(job_id, next).to_bytes(),
                version.to_bytes()?,
            );
            batch.put_cf(
                self.cf(CF_ACTIVE_VERSIONS)?,
                ActiveVersionKey(job_id).to_bytes(),
                next.to_be_bytes(),
            );

            entity.metadata = commit.metadata.clone();
            entity.optimization_count += 1;
            entity.last_optimized_at = Some(commit.applied_at);
            job.next_optimization_at = Some(commit.applied_at + commit.cooldown);

            batch.put_cf(
                self.cf(CF_ENTITIES)?,
                EntityKey(&entity.entity_id).to_bytes(),
                entity.to_bytes()?,
            );
            batch.put_cf(self.cf(CF_JOBS)?, JobKey(job_id).to_bytes(), job.to_bytes()?);

            self.db.write(batch)?;

            info!(
                job_id = %job_id,
                version = next,
                rank_before = ?version.rank_before,
                optimization_count = entity.optimization_count,
                "Committed optimization version"
            );
            Ok(version)
        })
    }

    /// Get the active version of a job, if any optimization was applied.
    pub fn active_version(
        &self,
        job_id: &str,
    ) -> Result<Option<OptimizationVersion>, StorageError> {
        let cf = self.cf(CF_ACTIVE_VERSIONS)?;
        let version = match self.db.get_cf(cf, ActiveVersionKey(job_id).to_bytes())? {
            Some(b) if b.len() >= 4 => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            _ => return Ok(None),
        };
        self.get_json(CF_VERSIONS, &VersionKey::new(job_id, version).to_bytes())
    }

    /// Highest version number recorded for a job (0 when none).
    fn max_version(&self, job_id: &str) -> Result<u32, StorageError> {
        let last = self.scan_prefix_rev(CF_VERSIONS, &VersionKey::prefix(job_id), Some(1))?;
        match last.first() {
            Some((key, _)) => Ok(VersionKey::from_bytes(key)?.version),
            None => Ok(0),
        }
    }

    /// All versions of a job, newest first.
    pub fn version_history(
        &self,
        job_id: &str,
    ) -> Result<Vec<OptimizationVersion>, StorageError> {
        self.scan_prefix_rev(CF_VERSIONS, &VersionKey::prefix(job_id), None)?
            .into_iter()
            .map(|(_, value)| OptimizationVersion::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    // ==================== Keywords ====================

    /// Start tracking a supplementary keyword for an entity.
    pub fn add_keyword(
        &self,
        entity_id: &str,
        keyword: &str,
    ) -> Result<TrackedKeyword, StorageError> {
        let keyword = normalize_keyword(keyword)?;
        if self.get_entity(entity_id)?.is_none() {
            return Err(StorageError::NotFound(format!("entity {}", entity_id)));
        }

        self.locks
            .with_lock(LockKey::keyword(entity_id, &keyword), || {
                let key = KeywordKey::new(entity_id, &keyword).to_bytes();
                if self.get_json::<TrackedKeyword>(CF_KEYWORDS, &key)?.is_some() {
                    return Err(StorageError::AlreadyExists(format!(
                        "keyword {:?} for entity {}",
                        keyword, entity_id
                    )));
                }

                let tracked = TrackedKeyword::new(entity_id, keyword.as_str());
                self.db
                    .put_cf(self.cf(CF_KEYWORDS)?, key, tracked.to_bytes()?)?;

                debug!(entity_id = %entity_id, keyword = %keyword, "Added tracked keyword");
                Ok(tracked)
            })
    }

    /// Stop tracking a keyword and drop its sample stream.
    ///
    /// Returns false when the keyword was not tracked.
    pub fn remove_keyword(&self, entity_id: &str, keyword: &str) -> Result<bool, StorageError> {
        let keyword = normalize_keyword(keyword)?;
        let lock_key = LockKey::keyword(entity_id, &keyword);

        let removed = self.locks.with_lock(lock_key.clone(), || {
            let key = KeywordKey::new(entity_id, &keyword).to_bytes();
            let Some(tracked) = self.get_json::<TrackedKeyword>(CF_KEYWORDS, &key)? else {
                return Ok(false);
            };

            let mut batch = WriteBatch::default();
            batch.delete_cf(self.cf(CF_KEYWORDS)?, key);
            for (sample_key, _) in self.scan_prefix(
                CF_KEYWORD_SAMPLES,
                &KeywordSampleKey::prefix(&tracked.keyword_id),
            )? {
                batch.delete_cf(self.cf(CF_KEYWORD_SAMPLES)?, sample_key);
            }
            self.db.write(batch)?;

            debug!(entity_id = %entity_id, keyword = %keyword, "Removed tracked keyword");
            Ok(true)
        })?;

        self.locks.forget(&lock_key);
        Ok(removed)
    }

    /// Get one tracked keyword.
    pub fn get_keyword(
        &self,
        entity_id: &str,
        keyword: &str,
    ) -> Result<Option<TrackedKeyword>, StorageError> {
        let keyword = normalize_keyword(keyword)?;
        self.get_json(CF_KEYWORDS, &KeywordKey::new(entity_id, &keyword).to_bytes())
    }

    /// Keywords tracked for an entity, newest first.
    pub fn list_keywords(&self, entity_id: &str) -> Result<Vec<TrackedKeyword>, StorageError> {
        let mut keywords = self
            .scan_prefix(CF_KEYWORDS, &KeywordKey::prefix(entity_id))?
            .into_iter()
            .map(|(_, value)| TrackedKeyword::from_bytes(&value).map_err(StorageError::from))
            .collect::<Result<Vec<_>, _>>()?;

        keywords.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.keyword_id.cmp(&a.keyword_id))
        });
        Ok(keywords)
    }

    /// Record a keyword rank lookup.
    ///
    /// Unlike the topic rank, a keyword's `current_rank` mirrors the latest
    /// check, so "not found" clears it. Only resolved ranks are sampled.
    pub fn record_keyword_check(
        &self,
        entity_id: &str,
        keyword: &str,
        rank: Option<u32>,
        observed_at: DateTime<Utc>,
    ) -> Result<TrackedKeyword, StorageError> {
        if rank == Some(0) {
            return Err(StorageError::InvalidInput("rank 0 is not valid".to_string()));
        }
        let keyword = normalize_keyword(keyword)?;

        self.locks
            .with_lock(LockKey::keyword(entity_id, &keyword), || {
                let key = KeywordKey::new(entity_id, &keyword).to_bytes();
                let mut tracked = self
                    .get_json::<TrackedKeyword>(CF_KEYWORDS, &key)?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!("keyword {:?} for {}", keyword, entity_id))
                    })?;

                tracked.current_rank = rank;
                tracked.last_checked_at = Some(observed_at);

                let mut batch = WriteBatch::default();
                batch.put_cf(self.cf(CF_KEYWORDS)?, key, tracked.to_bytes()?);
                if let Some(rank) = rank {
                    let sample = KeywordRankSample {
                        entity_id: entity_id.to_string(),
                        keyword: keyword.clone(),
                        rank,
                        observed_at,
                    };
                    batch.put_cf(
                        self.cf(CF_KEYWORD_SAMPLES)?,
                        KeywordSampleKey::new(&tracked.keyword_id, observed_at.timestamp_millis())
                            .to_bytes(),
                        sample.to_bytes()?,
                    );
                }
                self.db.write(batch)?;
                Ok(tracked)
            })
    }

    /// Rank samples for a keyword, newest first.
    pub fn keyword_history(
        &self,
        entity_id: &str,
        keyword: &str,
        limit: Option<usize>,
    ) -> Result<Vec<KeywordRankSample>, StorageError> {
        let Some(tracked) = self.get_keyword(entity_id, keyword)? else {
            return Ok(Vec::new());
        };
        self.scan_prefix_rev(
            CF_KEYWORD_SAMPLES,
            &KeywordSampleKey::prefix(&tracked.keyword_id),
            limit,
        )?
        .into_iter()
        .map(|(_, value)| KeywordRankSample::from_bytes(&value).map_err(StorageError::from))
        .collect()
    }

    // ===== Admin Operations =====

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        self.db.compact_range::<&[u8], &[u8]>(None, None);
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Trigger compaction on a specific column family.
    pub fn compact_cf(&self, cf_name: &str) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        info!(cf = %cf_name, "Starting compaction...");
        self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
        info!(cf = %cf_name, "Compaction complete");
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let jobs = self.list_jobs(None)?;

        Ok(StorageStats {
            entity_count: self.count_cf_entries(CF_ENTITIES)?,
            job_count: jobs.len() as u64,
            active_job_count: jobs.iter().filter(|j| j.is_active()).count() as u64,
            version_count: self.count_cf_entries(CF_VERSIONS)?,
            rank_sample_count: self.count_cf_entries(CF_RANK_SAMPLES)?,
            keyword_count: self.count_cf_entries(CF_KEYWORDS)?,
            keyword_sample_count: self.count_cf_entries(CF_KEYWORD_SAMPLES)?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf_name: &str) -> Result<u64, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        std::fs::read_dir(self.db.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.metadata().ok())
                    .map(|metadata| metadata.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Serialize)]
pub struct StorageStats {
    pub entity_count: u64,
    pub job_count: u64,
    pub active_job_count: u64,
    pub version_count: u64,
    pub rank_sample_count: u64,
    pub keyword_count: u64,
    pub keyword_sample_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
