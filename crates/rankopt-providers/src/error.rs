//! Collaborator error taxonomy.

use thiserror::Error;

/// Failure reported by a collaborator.
///
/// The variant decides what the scheduler does next: only `Transient`
/// failures are expected to clear on their own by the next cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network or quota failure
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Missing credential or misconfiguration
    #[error("Provider configuration error: {0}")]
    Config(String),

    /// Malformed or missing generator output
    #[error("Metadata generation failed: {0}")]
    Generation(String),

    /// External metadata write rejected
    #[error("Metadata apply failed: {0}")]
    Apply(String),
}

impl ProviderError {
    /// True when the next scheduled cycle may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Short label for logs and pass records.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Transient(_) => "transient",
            ProviderError::Config(_) => "config",
            ProviderError::Generation(_) => "generation",
            ProviderError::Apply(_) => "apply",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProviderError::Transient("quota".into()).is_retryable());
        assert!(!ProviderError::Config("no key".into()).is_retryable());
        assert!(!ProviderError::Generation("empty".into()).is_retryable());
        assert!(!ProviderError::Apply("403".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ProviderError::Apply("video not owned".into());
        assert_eq!(err.to_string(), "Metadata apply failed: video not owned");
        assert_eq!(err.kind(), "apply");
    }
}
