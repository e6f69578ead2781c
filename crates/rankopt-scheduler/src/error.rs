//! Error types for the scheduler crate.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use rankopt_providers::ProviderError;
use rankopt_storage::StorageError;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Invalid trigger or concurrency settings
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Entity not tracked: {0}")]
    EntityNotFound(String),

    /// Passes only run for active jobs
    #[error("Job is not active: {0}")]
    JobInactive(String),

    /// Another pass for the same job has not finished yet
    #[error("Pass already in flight for job {0}")]
    PassInFlight(String),

    #[error("Pass for job {0} exceeded its time limit")]
    PassTimeout(String),

    /// Scheduler is already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler is not running")]
    NotRunning,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl SchedulerError {
    /// True when the next cycle may succeed without outside intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::Provider(e) => e.is_retryable(),
            SchedulerError::PassInFlight(_) | SchedulerError::PassTimeout(_) => true,
            SchedulerError::Storage(StorageError::Conflict(_)) => true,
            _ => false,
        }
    }
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::InvalidCron("bad expression".to_string());
        assert!(err.to_string().contains("Invalid cron expression"));

        let err = SchedulerError::JobInactive("01HX".to_string());
        assert!(err.to_string().contains("not active"));

        let err = SchedulerError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));

        let err = SchedulerError::Provider(ProviderError::Apply("403".into()));
        assert_eq!(err.to_string(), "Metadata apply failed: 403");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SchedulerError::Provider(ProviderError::Transient("quota".into())).is_retryable());
        assert!(!SchedulerError::Provider(ProviderError::Config("no key".into())).is_retryable());
        assert!(SchedulerError::PassInFlight("j".into()).is_retryable());
        assert!(!SchedulerError::JobNotFound("j".into()).is_retryable());
    }
}
