//! Tracked entity: one video under optimization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RankoptError;
use crate::metadata::Metadata;

/// Target rank used when the tracking request does not supply one.
pub const DEFAULT_TARGET_RANK: u32 = 5;

fn default_target_rank() -> u32 {
    DEFAULT_TARGET_RANK
}

/// A video whose search rank is tracked and optimized.
///
/// `optimization_count` is advanced exactly once per applied version and
/// never otherwise, so it always equals the number of versions the store
/// has activated for this entity's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// External identifier (the provider's video id). Immutable.
    pub entity_id: String,

    /// Search query used for primary ranking
    pub topic: String,

    /// Currently applied metadata
    pub metadata: Metadata,

    #[serde(default = "default_target_rank")]
    pub target_rank: u32,

    /// Last known 1-based rank, `None` while unknown
    #[serde(default)]
    pub current_rank: Option<u32>,

    #[serde(default)]
    pub optimization_count: u32,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_optimized_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl TrackedEntity {
    /// Create a new entity with the default target rank and no rank data.
    pub fn new(entity_id: impl Into<String>, topic: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            entity_id: entity_id.into(),
            topic: topic.into(),
            metadata,
            target_rank: DEFAULT_TARGET_RANK,
            current_rank: None,
            optimization_count: 0,
            last_optimized_at: None,
            created_at: Utc::now(),
        }
    }

    /// Override the target rank.
    pub fn with_target_rank(mut self, target_rank: u32) -> Self {
        self.target_rank = target_rank;
        self
    }

    /// Whether the last known rank already meets the target.
    pub fn target_met(&self) -> bool {
        matches!(self.current_rank, Some(rank) if rank <= self.target_rank)
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

/// Validate an external entity id before it is used in storage keys.
///
/// Ids must be non-empty and free of whitespace and `:`, which separates
/// key segments.
pub fn validate_entity_id(entity_id: &str) -> Result<(), RankoptError> {
    if entity_id.is_empty() {
        return Err(RankoptError::InvalidInput("entity_id is empty".to_string()));
    }
    if entity_id.contains(':') || entity_id.chars().any(char::is_whitespace) {
        return Err(RankoptError::InvalidInput(format!(
            "entity_id contains reserved characters: {:?}",
            entity_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrackedEntity {
        TrackedEntity::new(
            "abc123",
            "rust async",
            Metadata::new("Rust async explained", vec!["rust".into()], "desc"),
        )
    }

    #[test]
    fn test_new_defaults() {
        let entity = sample();
        assert_eq!(entity.target_rank, DEFAULT_TARGET_RANK);
        assert_eq!(entity.current_rank, None);
        assert_eq!(entity.optimization_count, 0);
        assert!(entity.last_optimized_at.is_none());
    }

    #[test]
    fn test_target_met() {
        let mut entity = sample().with_target_rank(3);
        assert!(!entity.target_met());
        entity.current_rank = Some(7);
        assert!(!entity.target_met());
        entity.current_rank = Some(3);
        assert!(entity.target_met());
    }

    #[test]
    fn test_bytes_roundtrip_preserves_optional_timestamp() {
        let mut entity = sample();
        entity.last_optimized_at = Some(Utc::now());
        let decoded = TrackedEntity::from_bytes(&entity.to_bytes().unwrap()).unwrap();
        assert_eq!(
            decoded.last_optimized_at.map(|t| t.timestamp_millis()),
            entity.last_optimized_at.map(|t| t.timestamp_millis())
        );
    }

    #[test]
    fn test_validate_entity_id() {
        assert!(validate_entity_id("dQw4w9WgXcQ").is_ok());
        assert!(validate_entity_id("").is_err());
        assert!(validate_entity_id("a:b").is_err());
        assert!(validate_entity_id("a b").is_err());
    }
}
