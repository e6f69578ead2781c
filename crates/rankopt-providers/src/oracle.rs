//! Rank lookup contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Number of search results inspected when none is configured.
pub const DEFAULT_TOP_K: u32 = 50;

/// Result of looking an entity up in the search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankLookup {
    /// 1-based position within the top-K
    Position(u32),
    /// Not present in the top-K
    NotFound,
}

impl RankLookup {
    pub fn position(&self) -> Option<u32> {
        match self {
            RankLookup::Position(p) => Some(*p),
            RankLookup::NotFound => None,
        }
    }
}

impl From<Option<u32>> for RankLookup {
    fn from(value: Option<u32>) -> Self {
        value.map_or(RankLookup::NotFound, RankLookup::Position)
    }
}

/// Locates an entity within the search results for a query.
///
/// Failures must be `Transient` or `Config`; anything else is treated as
/// a transient failure by the scheduler.
#[async_trait]
pub trait RankOracle: Send + Sync {
    async fn lookup(
        &self,
        query: &str,
        target_id: &str,
        top_k: u32,
    ) -> Result<RankLookup, ProviderError>;
}
