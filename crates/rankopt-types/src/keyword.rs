//! Supplementary keywords tracked per entity.
//!
//! Each keyword carries its own rank sample stream keyed by
//! `(entity_id, keyword)`, independent of the job's topic history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::RankoptError;

/// Normalize a keyword the way it is stored: trimmed and lowercased.
pub fn normalize_keyword(keyword: &str) -> Result<String, RankoptError> {
    let normalized = keyword.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(RankoptError::InvalidInput("keyword is empty".to_string()));
    }
    Ok(normalized)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedKeyword {
    /// ULID, also the key of this keyword's sample stream
    pub keyword_id: String,

    pub entity_id: String,

    /// Normalized keyword text
    pub keyword: String,

    #[serde(default)]
    pub current_rank: Option<u32>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_checked_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl TrackedKeyword {
    /// Create a keyword record; the text must already be normalized.
    pub fn new(entity_id: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            keyword_id: Ulid::new().to_string(),
            entity_id: entity_id.into(),
            keyword: keyword.into(),
            current_rank: None,
            last_checked_at: None,
            created_at: Utc::now(),
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

/// One resolved rank observation for a tracked keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRankSample {
    pub entity_id: String,
    pub keyword: String,
    pub rank: u32,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub observed_at: DateTime<Utc>,
}

impl KeywordRankSample {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
