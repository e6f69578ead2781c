//! Job store for the rankopt scheduler.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for entities, jobs, versions, and rank series
//! - Time-prefixed sample keys for newest-first range scans
//! - Atomic multi-record commits via WriteBatch
//! - Mutually exclusive read-modify-write per job
//! - Per-job pass claims shared by every scheduler on the store

pub mod claims;
pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod locks;

pub use claims::{PassClaim, PassClaims};
pub use db::{CommitOptimization, RankCheckOutcome, StartJob, Storage, StorageStats};
pub use error::StorageError;
pub use keys::{
    ActiveVersionKey, EntityKey, JobIndexKey, JobKey, KeywordKey, KeywordSampleKey, RankSampleKey,
    VersionKey,
};
pub use locks::{JobLocks, LockKey};
