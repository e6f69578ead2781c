//! Optimization version: one row per applied metadata change.
//!
//! Versions are numbered per job starting at 1, gap-free, and never reused.
//! At most one version per job is active: the most recently applied one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationVersion {
    pub job_id: String,

    /// Per-job sequence number, starting at 1
    pub version: u32,

    /// Metadata that was applied externally
    pub metadata: Metadata,

    /// Rank observed when this version was applied
    #[serde(default)]
    pub rank_before: Option<u32>,

    /// First resolved rank observed after this version was applied
    #[serde(default)]
    pub rank_after: Option<u32>,

    pub is_active: bool,

    /// Generator's explanation of the change, when it gave one
    #[serde(default)]
    pub reasoning: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl OptimizationVersion {
    /// Build the next active version for a job.
    pub fn new(
        job_id: impl Into<String>,
        version: u32,
        metadata: Metadata,
        rank_before: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            version,
            metadata,
            rank_before,
            rank_after: None,
            is_active: true,
            reasoning: None,
            created_at,
        }
    }

    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Whether this version still waits for its post-apply rank.
    pub fn awaiting_rank_after(&self) -> bool {
        self.is_active && self.rank_after.is_none()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_version_awaits_rank_after() {
        let v = OptimizationVersion::new("job", 1, Metadata::default(), Some(14), Utc::now());
        assert!(v.is_active);
        assert!(v.awaiting_rank_after());

        let mut resolved = v.clone();
        resolved.rank_after = Some(9);
        assert!(!resolved.awaiting_rank_after());

        let mut inactive = v;
        inactive.is_active = false;
        assert!(!inactive.awaiting_rank_after());
    }
}
