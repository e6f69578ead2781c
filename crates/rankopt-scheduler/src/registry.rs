//! Per-job pass status and cycle history.
//!
//! The registry is observability only: it never gates a pass. Overlap is
//! enforced by the store's pass claims (`Storage::try_claim_pass`), and a
//! pass is only recorded here once its claim is held.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one pass as seen by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassResult {
    /// Rank checked, policy declined to optimize
    Checked { rank: Option<u32>, decision: String },
    /// Rank checked and a new version applied
    Optimized { rank: Option<u32>, version: u32 },
    /// Not run (overlap, shutdown)
    Skipped(String),
    Failed(String),
}

/// Status of a job's passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassStatus {
    pub job_id: String,
    pub entity_id: String,
    /// When the last pass finished
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<PassResult>,
    pub run_count: u64,
    pub error_count: u64,
    /// Consecutive failed passes; reset by any success
    pub consecutive_failures: u64,
    pub is_running: bool,
}

impl PassStatus {
    pub fn new(job_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            entity_id: entity_id.into(),
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            consecutive_failures: 0,
            is_running: false,
        }
    }
}

/// Totals for one scheduling cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Active jobs enumerated at cycle start
    pub jobs: usize,
    pub checked: usize,
    pub optimized: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleSummary {
    /// Count one pass result.
    pub fn tally(&mut self, result: &PassResult) {
        match result {
            PassResult::Checked { .. } => self.checked += 1,
            PassResult::Optimized { .. } => {
                self.checked += 1;
                self.optimized += 1;
            }
            PassResult::Skipped(_) => self.skipped += 1,
            PassResult::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    passes: HashMap<String, PassStatus>,
    last_cycle: Option<CycleSummary>,
    cycle_count: u64,
}

/// Thread-safe registry of pass outcomes.
///
/// ```
/// use rankopt_scheduler::{PassRegistry, PassResult};
///
/// let registry = PassRegistry::new();
/// registry.record_start("job-1", "video-1");
/// assert!(registry.is_running("job-1"));
///
/// registry.record_complete("job-1", PassResult::Skipped("overlap".into()), 0);
/// assert!(!registry.is_running("job-1"));
/// ```
#[derive(Default)]
pub struct PassRegistry {
    state: RwLock<RegistryState>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a pass as started, registering the job on first sight.
    pub fn record_start(&self, job_id: &str, entity_id: &str) {
        let mut state = self.write();
        let status = state
            .passes
            .entry(job_id.to_string())
            .or_insert_with(|| PassStatus::new(job_id, entity_id));
        status.is_running = true;
    }

    /// Record a finished pass. Unknown jobs are ignored.
    pub fn record_complete(&self, job_id: &str, result: PassResult, duration_ms: u64) {
        let mut state = self.write();
        if let Some(status) = state.passes.get_mut(job_id) {
            status.is_running = false;
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            match result {
                PassResult::Failed(_) => {
                    status.error_count += 1;
                    status.consecutive_failures += 1;
                }
                PassResult::Skipped(_) => {}
                _ => status.consecutive_failures = 0,
            }
            status.last_result = Some(result);
        }
    }

    pub fn record_cycle(&self, summary: CycleSummary) {
        let mut state = self.write();
        state.cycle_count += 1;
        state.last_cycle = Some(summary);
    }

    /// Drop a job's status, e.g. after it was untracked.
    pub fn forget(&self, job_id: &str) {
        self.write().passes.remove(job_id);
    }

    pub fn get_status(&self, job_id: &str) -> Option<PassStatus> {
        self.read().passes.get(job_id).cloned()
    }

    pub fn get_all_status(&self) -> Vec<PassStatus> {
        let mut all: Vec<PassStatus> = self.read().passes.values().cloned().collect();
        all.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        all
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.read()
            .passes
            .get(job_id)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn last_cycle(&self) -> Option<CycleSummary> {
        self.read().last_cycle.clone()
    }

    pub fn cycle_count(&self) -> u64 {
        self.read().cycle_count
    }

    pub fn job_count(&self) -> usize {
        self.read().passes.len()
    }
}
