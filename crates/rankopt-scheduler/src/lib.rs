//! Optimization scheduling for rankopt.
//!
//! # Features
//!
//! - Pure decision policy: attempt cap, target rank, cooldown
//! - Per-job pass: rank check, `rank_after` backfill, propose/apply/commit
//! - At most one pass in flight per job across every scheduler on a store;
//!   failures isolated per job
//! - Cycles over all active jobs with bounded concurrency, jitter, timeouts
//! - Interval, cron (timezone-aware), or manual triggers
//! - Graceful shutdown via CancellationToken
//! - Pass and cycle observability via PassRegistry
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rankopt_scheduler::{JobScheduler, SchedulerConfig, SchedulerService};
//!
//! let passes = JobScheduler::new(storage, oracle, generator, applier, credential)
//!     .with_policy((&settings.policy).into())
//!     .with_top_k(settings.search_top_k);
//!
//! let mut scheduler =
//!     SchedulerService::new(SchedulerConfig::from(&settings.scheduler), Arc::new(passes)).await?;
//! scheduler.start().await?;
//!
//! // ...
//! scheduler.shutdown().await?;
//! ```

mod clock;
mod config;
mod cycle;
mod error;
mod jitter;
mod pass;
mod policy;
mod registry;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use cycle::{run_cycle, CycleOptions};
pub use error::SchedulerError;
pub use jitter::{with_jitter, JitterConfig};
pub use pass::{JobScheduler, PassOutcome};
pub use policy::{Decision, OptimizationPolicy};
pub use registry::{CycleSummary, PassRegistry, PassResult, PassStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
