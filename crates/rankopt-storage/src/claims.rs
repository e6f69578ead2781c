//! At most one pass in flight per job, across every scheduler sharing the
//! store.
//!
//! A pass claims its job before the rank check and keeps the claim until
//! its commit (or failure). Whoever finds the job already claimed skips it
//! rather than queueing behind it.

use std::sync::Arc;

use dashmap::DashSet;

/// Set of job ids with a pass currently executing.
#[derive(Default, Clone)]
pub struct PassClaims {
    running: Arc<DashSet<String>>,
}

impl PassClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the job for one pass.
    ///
    /// Returns `None` when another pass for the job holds the claim.
    pub fn try_claim(&self, job_id: &str) -> Option<PassClaim> {
        if self.running.insert(job_id.to_string()) {
            Some(PassClaim {
                job_id: job_id.to_string(),
                running: self.running.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_claimed(&self, job_id: &str) -> bool {
        self.running.contains(job_id)
    }

    pub fn count(&self) -> usize {
        self.running.len()
    }
}

/// Claim on a job; released on drop, including when the pass future is
/// dropped or panics.
#[derive(Debug)]
pub struct PassClaim {
    job_id: String,
    running: Arc<DashSet<String>>,
}

impl PassClaim {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for PassClaim {
    fn drop(&mut self) {
        self.running.remove(&self.job_id);
    }
}
