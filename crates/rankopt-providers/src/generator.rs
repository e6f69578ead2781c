//! Metadata generation contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rankopt_types::Metadata;

use crate::error::ProviderError;

/// What the generator knows about the ranking situation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingContext {
    pub topic: String,
    /// Last known rank, `None` if the entity was never found
    pub current_rank: Option<u32>,
    pub target_rank: u32,
}

/// Proposed replacement metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataProposal {
    pub metadata: Metadata,

    /// Free-form explanation of the change
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl MetadataProposal {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Proposes improved metadata for an entity.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    /// Fails with `ProviderError::Generation` on malformed or missing output.
    async fn propose(
        &self,
        current: &Metadata,
        context: &RankingContext,
    ) -> Result<MetadataProposal, ProviderError>;
}
