//! # rankopt-types
//!
//! Shared domain types for the rankopt optimization scheduler.
//!
//! This crate defines the records persisted by the job store and passed
//! between the scheduler and its collaborators:
//! - Entities: Videos under optimization with their current metadata
//! - Jobs: The schedulable unit tied 1:1 to an entity
//! - Versions: Append-only history of applied metadata changes
//! - Rank samples: Append-only rank time series per job and per keyword
//! - Settings: Layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use rankopt_types::{Metadata, TrackedEntity};
//!
//! let metadata = Metadata::new("My video", vec!["rust".to_string()], "About rust");
//! let entity = TrackedEntity::new("dQw4w9WgXcQ", "rust tutorial", metadata);
//! assert_eq!(entity.target_rank, 5);
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod job;
pub mod keyword;
pub mod metadata;
pub mod rank;
pub mod version;

pub use config::{PolicySettings, SchedulerSettings, Settings, TriggerMode};
pub use entity::{validate_entity_id, TrackedEntity, DEFAULT_TARGET_RANK};
pub use error::RankoptError;
pub use job::{JobStatus, OptimizationJob};
pub use keyword::{normalize_keyword, KeywordRankSample, TrackedKeyword};
pub use metadata::Metadata;
pub use rank::RankSample;
pub use version::OptimizationVersion;
