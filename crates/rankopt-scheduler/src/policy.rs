//! Optimization decision policy.
//!
//! Pure function of the entity's rank state and an explicit `now`. Rules
//! short-circuit in this order:
//! 1. attempt cap reached
//! 2. known rank already at or above target
//! 3. last optimization inside the cooldown window
//! 4. otherwise optimize

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use rankopt_types::PolicySettings;

/// Outcome of a policy evaluation, with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Decision {
    Optimize,
    AttemptCapReached { count: u32, max_attempts: u32 },
    TargetMet { rank: u32, target_rank: u32 },
    CoolingDown { remaining_secs: i64 },
}

impl Decision {
    pub fn should_optimize(&self) -> bool {
        matches!(self, Decision::Optimize)
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Optimize => "optimize",
            Decision::AttemptCapReached { .. } => "attempt_cap",
            Decision::TargetMet { .. } => "target_met",
            Decision::CoolingDown { .. } => "cooldown",
        }
    }
}

/// Attempt cap and cooldown applied to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationPolicy {
    max_attempts: u32,
    cooldown: Duration,
}

impl Default for OptimizationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            cooldown: Duration::hours(24),
        }
    }
}

impl From<&PolicySettings> for OptimizationPolicy {
    fn from(settings: &PolicySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::hours(i64::from(settings.cooldown_hours)),
        )
    }
}

impl OptimizationPolicy {
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts,
            cooldown,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Evaluate the rules and report which one decided.
    ///
    /// An unknown rank never blocks optimization; a cooldown boundary hit
    /// exactly (`now - last == cooldown`) is outside the window.
    pub fn decide(
        &self,
        current_rank: Option<u32>,
        target_rank: u32,
        last_optimized_at: Option<DateTime<Utc>>,
        optimization_count: u32,
        now: DateTime<Utc>,
    ) -> Decision {
        if optimization_count >= self.max_attempts {
            return Decision::AttemptCapReached {
                count: optimization_count,
                max_attempts: self.max_attempts,
            };
        }

        if let Some(rank) = current_rank {
            if rank <= target_rank {
                return Decision::TargetMet { rank, target_rank };
            }
        }

        if let Some(last) = last_optimized_at {
            let elapsed = now - last;
            if elapsed < self.cooldown {
                return Decision::CoolingDown {
                    remaining_secs: (self.cooldown - elapsed).num_seconds(),
                };
            }
        }

        Decision::Optimize
    }

    pub fn should_optimize(
        &self,
        current_rank: Option<u32>,
        target_rank: u32,
        last_optimized_at: Option<DateTime<Utc>>,
        optimization_count: u32,
        now: DateTime<Utc>,
    ) -> bool {
        self.decide(
            current_rank,
            target_rank,
            last_optimized_at,
            optimization_count,
            now,
        )
        .should_optimize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_attempt_cap_wins_over_everything() {
        let policy = OptimizationPolicy::default();
        assert!(!policy.should_optimize(Some(50), 5, None, 5, now()));
        assert!(!policy.should_optimize(None, 5, None, 7, now()));
        assert_eq!(
            policy.decide(Some(50), 5, None, 5, now()),
            Decision::AttemptCapReached {
                count: 5,
                max_attempts: 5
            }
        );
    }

    #[test]
    fn test_target_met() {
        let policy = OptimizationPolicy::default();
        assert!(!policy.should_optimize(Some(3), 5, None, 0, now()));
        assert!(!policy.should_optimize(Some(5), 5, None, 0, now()));
        assert!(policy.should_optimize(Some(6), 5, None, 0, now()));
    }

    #[test]
    fn test_cooldown_window() {
        let policy = OptimizationPolicy::default();
        let t = now();
        assert!(!policy.should_optimize(Some(20), 5, Some(t - Duration::hours(1)), 1, t));
        assert!(policy.should_optimize(Some(20), 5, Some(t - Duration::hours(25)), 1, t));

        match policy.decide(Some(20), 5, Some(t - Duration::hours(1)), 1, t) {
            Decision::CoolingDown { remaining_secs } => assert_eq!(remaining_secs, 23 * 3600),
            other => panic!("expected cooldown, got {:?}", other),
        }
    }

    #[test]
    fn test_cooldown_boundary_is_exclusive() {
        let policy = OptimizationPolicy::default();
        let t = now();
        assert!(policy.should_optimize(Some(20), 5, Some(t - Duration::hours(24)), 1, t));
        assert!(!policy.should_optimize(
            Some(20),
            5,
            Some(t - Duration::hours(24) + Duration::seconds(1)),
            1,
            t
        ));
    }

    #[test]
    fn test_unknown_rank_does_not_block() {
        let policy = OptimizationPolicy::default();
        assert!(policy.should_optimize(None, 5, None, 0, now()));
    }

    #[test]
    fn test_rule_order() {
        let policy = OptimizationPolicy::default();
        let t = now();
        // Target met beats cooldown
        assert_eq!(
            policy.decide(Some(2), 5, Some(t - Duration::minutes(5)), 1, t).label(),
            "target_met"
        );
        // Cap beats target met
        assert_eq!(policy.decide(Some(2), 5, None, 5, t).label(), "attempt_cap");
    }

    #[test]
    fn test_configurable_policy() {
        let settings = PolicySettings {
            max_attempts: 2,
            cooldown_hours: 1,
        };
        let policy = OptimizationPolicy::from(&settings);
        let t = now();
        assert!(!policy.should_optimize(Some(40), 5, None, 2, t));
        assert!(policy.should_optimize(Some(40), 5, Some(t - Duration::minutes(61)), 1, t));
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&Decision::TargetMet {
            rank: 3,
            target_rank: 5,
        })
        .unwrap();
        assert_eq!(json, r#"{"decision":"target_met","rank":3,"target_rank":5}"#);
    }
}
