//! Random start delay for passes.
//!
//! Spreads the passes of one cycle so a large job set does not hit the
//! ranking provider in a single burst.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound for the random delay applied before each pass.
///
/// # Example
///
/// ```
/// use rankopt_scheduler::JitterConfig;
///
/// let config = JitterConfig::new(30);
/// let delay = config.generate_jitter();
/// assert!(delay < std::time::Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JitterConfig {
    /// Maximum jitter in seconds (0 = no jitter).
    pub max_jitter_secs: u64,
}

impl JitterConfig {
    pub fn new(max_jitter_secs: u64) -> Self {
        Self { max_jitter_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Random duration in `[0, max_jitter_secs)`, or zero when disabled.
    pub fn generate_jitter(&self) -> Duration {
        if self.max_jitter_secs == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::rng().random_range(0..self.max_jitter_secs * 1000);
        Duration::from_millis(jitter_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_jitter_secs > 0
    }
}

/// Sleep for a random jitter, then run `job_fn`.
pub async fn with_jitter<F, T>(config: &JitterConfig, job_fn: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let jitter = config.generate_jitter();
    if !jitter.is_zero() {
        tracing::debug!(jitter_ms = jitter.as_millis(), "Delaying pass");
        tokio::time::sleep(jitter).await;
    }
    job_fn.await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_disabled() {
        let config = JitterConfig::none();
        assert_eq!(config.generate_jitter(), Duration::ZERO);
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_jitter_within_bounds_and_varied() {
        let config = JitterConfig::new(10);
        let samples: Vec<Duration> = (0..500).map(|_| config.generate_jitter()).collect();

        assert!(samples.iter().all(|s| *s < Duration::from_secs(10)));
        let unique: std::collections::HashSet<_> = samples.iter().map(|d| d.as_millis()).collect();
        assert!(unique.len() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_jitter_returns_value() {
        let result = with_jitter(&JitterConfig::new(2), async { 42 }).await;
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_with_jitter_zero_is_immediate() {
        let start = std::time::Instant::now();
        let result = with_jitter(&JitterConfig::none(), async { "done" }).await;
        assert_eq!(result, "done");
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
