//! Deterministic collaborators for tests and local dry runs.
//!
//! None of these touch the network. Each records the calls it receives so
//! tests can assert on what the scheduler asked for.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use rankopt_types::Metadata;

use crate::applier::{Ack, MetadataApplier};
use crate::error::ProviderError;
use crate::generator::{MetadataGenerator, MetadataProposal, RankingContext};
use crate::oracle::{RankLookup, RankOracle};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type LookupResult = Result<RankLookup, ProviderError>;

/// Oracle that replays scripted answers per query.
///
/// Each query has a queue of answers. When the queue runs dry the last
/// answer repeats; unknown queries answer `NotFound`.
#[derive(Default)]
pub struct ScriptedRankOracle {
    scripts: Mutex<HashMap<String, VecDeque<LookupResult>>>,
    last: Mutex<HashMap<String, LookupResult>>,
    calls: Mutex<Vec<(String, String, u32)>>,
    delay: Option<Duration>,
}

impl ScriptedRankOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long before answering each lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an answer for a query.
    pub fn push(&self, query: &str, answer: LookupResult) -> &Self {
        lock(&self.scripts)
            .entry(query.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub fn push_rank(&self, query: &str, rank: u32) -> &Self {
        self.push(query, Ok(RankLookup::Position(rank)))
    }

    pub fn push_not_found(&self, query: &str) -> &Self {
        self.push(query, Ok(RankLookup::NotFound))
    }

    pub fn push_error(&self, query: &str, error: ProviderError) -> &Self {
        self.push(query, Err(error))
    }

    /// Every `(query, target_id, top_k)` seen so far.
    pub fn calls(&self) -> Vec<(String, String, u32)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl RankOracle for ScriptedRankOracle {
    async fn lookup(&self, query: &str, target_id: &str, top_k: u32) -> LookupResult {
        lock(&self.calls).push((query.to_string(), target_id.to_string(), top_k));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.scripts)
            .get_mut(query)
            .and_then(|queue| queue.pop_front());

        let answer = match next {
            Some(answer) => {
                lock(&self.last).insert(query.to_string(), answer.clone());
                answer
            }
            None => lock(&self.last)
                .get(query)
                .cloned()
                .unwrap_or(Ok(RankLookup::NotFound)),
        };

        debug!(query = %query, target_id = %target_id, answer = ?answer, "Scripted lookup");
        answer
    }
}

/// Generator that derives a new title from the topic and attempt number.
pub struct MockGenerator {
    calls: AtomicUsize,
    failure: Mutex<Option<ProviderError>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Generator whose every proposal fails with `Generation`.
    pub fn failing(message: impl Into<String>) -> Self {
        let generator = Self::new();
        generator.fail_with(Some(ProviderError::Generation(message.into())));
        generator
    }

    /// Set or clear the failure returned by later calls.
    pub fn fail_with(&self, error: Option<ProviderError>) {
        *lock(&self.failure) = error;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataGenerator for MockGenerator {
    async fn propose(
        &self,
        current: &Metadata,
        context: &RankingContext,
    ) -> Result<MetadataProposal, ProviderError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }

        let mut tags: Vec<String> = context
            .topic
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        for tag in &current.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let metadata = Metadata::new(
            format!("{} | {} (rev {})", context.topic, current.title, attempt),
            tags,
            format!("{}\n\n{}", context.topic, current.description),
        );

        let reasoning = match context.current_rank {
            Some(rank) => format!(
                "Rank {} is above target {}; leading with the topic",
                rank, context.target_rank
            ),
            None => format!("Not in top results; leading with \"{}\"", context.topic),
        };

        Ok(MetadataProposal::new(metadata).with_reasoning(reasoning))
    }
}

/// Applier that records writes instead of performing them.
///
/// Rejects blank credentials with `Config` the way a real client would.
#[derive(Default)]
pub struct RecordingApplier {
    applied: Mutex<Vec<(String, Metadata)>>,
    failure: Mutex<Option<ProviderError>>,
    delay: Option<Duration>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applier whose every write fails with `Apply`.
    pub fn failing(message: impl Into<String>) -> Self {
        let applier = Self::new();
        applier.fail_with(Some(ProviderError::Apply(message.into())));
        applier
    }

    /// Wait this long before acknowledging each write.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_with(&self, error: Option<ProviderError>) {
        *lock(&self.failure) = error;
    }

    /// Every successful write, oldest first.
    pub fn applied(&self) -> Vec<(String, Metadata)> {
        lock(&self.applied).clone()
    }

    pub fn applied_count(&self) -> usize {
        lock(&self.applied).len()
    }
}

#[async_trait]
impl MetadataApplier for RecordingApplier {
    async fn apply(
        &self,
        target_id: &str,
        metadata: &Metadata,
        credential: &SecretString,
    ) -> Result<Ack, ProviderError> {
        if credential.expose_secret().trim().is_empty() {
            return Err(ProviderError::Config("missing provider credential".to_string()));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }

        let mut applied = lock(&self.applied);
        applied.push((target_id.to_string(), metadata.clone()));
        Ok(Ack {
            reference: Some(format!("{}#{}", target_id, applied.len())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(rank: Option<u32>) -> RankingContext {
        RankingContext {
            topic: "Rust Async".to_string(),
            current_rank: rank,
            target_rank: 5,
        }
    }

    #[tokio::test]
    async fn test_scripted_oracle_replays_then_repeats() {
        let oracle = ScriptedRankOracle::new();
        oracle.push_rank("rust", 12).push_not_found("rust");

        assert_eq!(
            oracle.lookup("rust", "vid", 50).await,
            Ok(RankLookup::Position(12))
        );
        assert_eq!(oracle.lookup("rust", "vid", 50).await, Ok(RankLookup::NotFound));
        assert_eq!(oracle.lookup("rust", "vid", 50).await, Ok(RankLookup::NotFound));
        assert_eq!(oracle.lookup("other", "vid", 50).await, Ok(RankLookup::NotFound));

        assert_eq!(oracle.call_count(), 4);
        assert_eq!(oracle.calls()[0], ("rust".to_string(), "vid".to_string(), 50));
    }

    #[tokio::test]
    async fn test_scripted_oracle_errors() {
        let oracle = ScriptedRankOracle::new();
        oracle.push_error("rust", ProviderError::Transient("quota".into()));

        let err = oracle.lookup("rust", "vid", 50).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_generator_proposal() {
        let generator = MockGenerator::new();
        let current = Metadata::new("My video", vec!["async".to_string()], "desc");

        let proposal = generator.propose(&current, &context(Some(20))).await.unwrap();
        assert_eq!(proposal.metadata.title, "Rust Async | My video (rev 1)");
        assert_eq!(proposal.metadata.tags, vec!["rust", "async"]);
        assert!(proposal.reasoning.unwrap().contains("20"));
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_generator_failure() {
        let generator = MockGenerator::failing("empty completion");
        let current = Metadata::new("t", vec![], "");

        let err = generator.propose(&current, &context(None)).await.unwrap_err();
        assert_eq!(err, ProviderError::Generation("empty completion".into()));
    }

    #[tokio::test]
    async fn test_recording_applier() {
        let applier = RecordingApplier::new();
        let metadata = Metadata::new("New", vec![], "");
        let credential = SecretString::from("token".to_string());

        let ack = applier.apply("vid", &metadata, &credential).await.unwrap();
        assert_eq!(ack.reference.as_deref(), Some("vid#1"));
        assert_eq!(applier.applied_count(), 1);

        applier.fail_with(Some(ProviderError::Apply("forbidden".into())));
        assert!(applier.apply("vid", &metadata, &credential).await.is_err());
        assert_eq!(applier.applied_count(), 1);
    }

    #[tokio::test]
    async fn test_recording_applier_rejects_blank_credential() {
        let applier = RecordingApplier::new();
        let metadata = Metadata::new("New", vec![], "");
        let credential = SecretString::from(String::new());

        let err = applier.apply("vid", &metadata, &credential).await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }
}
