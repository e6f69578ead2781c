//! Rank samples for a job's primary topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One resolved rank observation. "Not found" checks are never recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSample {
    pub job_id: String,

    /// 1-based position within the inspected top-K
    pub rank: u32,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub observed_at: DateTime<Utc>,
}

impl RankSample {
    pub fn new(job_id: impl Into<String>, rank: u32, observed_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            rank,
            observed_at,
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
