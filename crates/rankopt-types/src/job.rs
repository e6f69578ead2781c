//! Optimization job: the schedulable unit tied 1:1 to a tracked entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Lifecycle state of a job.
///
/// There is no terminal state: a stopped job can always be reactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Included in every scheduling cycle
    Active,
    /// Skipped by the scheduler until restarted
    Stopped,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Active => write!(f, "active"),
            JobStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(JobStatus::Active),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Persisted optimization job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationJob {
    /// ULID assigned at creation
    pub job_id: String,

    /// Owning entity
    pub entity_id: String,

    pub status: JobStatus,

    /// Rank when the job was created (or last restarted with fresh data)
    #[serde(default)]
    pub baseline_rank: Option<u32>,

    #[serde(default)]
    pub current_rank: Option<u32>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_rank_check_at: Option<DateTime<Utc>>,

    /// Earliest time the cooldown allows another optimization (advisory)
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub next_optimization_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl OptimizationJob {
    /// Create a new active job for an entity.
    pub fn new(entity_id: impl Into<String>, baseline_rank: Option<u32>) -> Self {
        Self {
            job_id: Ulid::new().to_string(),
            entity_id: entity_id.into(),
            status: JobStatus::Active,
            baseline_rank,
            current_rank: baseline_rank,
            last_rank_check_at: None,
            next_optimization_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }

    /// Signed rank movement since baseline; positive means the video climbed.
    pub fn rank_delta(&self) -> Option<i64> {
        match (self.baseline_rank, self.current_rank) {
            (Some(baseline), Some(current)) => Some(baseline as i64 - current as i64),
            _ => None,
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
