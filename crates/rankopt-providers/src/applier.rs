//! External metadata write contract.

use async_trait::async_trait;
use secrecy::SecretString;

use rankopt_types::Metadata;

use crate::error::ProviderError;

/// Confirmation that the provider accepted a metadata write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    /// Provider-side revision or request id, when one is returned
    pub reference: Option<String>,
}

/// Writes metadata to the ranking provider.
///
/// This is the only side-effecting external call of a pass. It is never
/// retried within a pass.
#[async_trait]
pub trait MetadataApplier: Send + Sync {
    async fn apply(
        &self,
        target_id: &str,
        metadata: &Metadata,
        credential: &SecretString,
    ) -> Result<Ack, ProviderError>;
}
