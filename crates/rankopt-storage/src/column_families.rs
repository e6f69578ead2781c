//! Column family definitions for RocksDB.
//!
//! Each column family isolates one logical table:
//! - entities: Tracked videos and their current metadata
//! - jobs: Optimization jobs
//! - job_index: entity_id -> job_id lookup
//! - versions: Append-only optimization versions per job
//! - active_versions: Active version pointer per job
//! - rank_samples: Append-only topic rank series (compressed)
//! - keywords: Supplementary keywords per entity
//! - keyword_samples: Append-only keyword rank series (compressed)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for tracked entities
pub const CF_ENTITIES: &str = "entities";

/// Column family name for optimization jobs
pub const CF_JOBS: &str = "jobs";

/// Column family name for the entity -> job index
pub const CF_JOB_INDEX: &str = "job_index";

/// Column family name for optimization versions
pub const CF_VERSIONS: &str = "versions";

/// Column family name for active version pointers
pub const CF_ACTIVE_VERSIONS: &str = "active_versions";

/// Column family name for topic rank samples
pub const CF_RANK_SAMPLES: &str = "rank_samples";

/// Column family name for tracked keywords
pub const CF_KEYWORDS: &str = "keywords";

/// Column family name for keyword rank samples
pub const CF_KEYWORD_SAMPLES: &str = "keyword_samples";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_ENTITIES,
    CF_JOBS,
    CF_JOB_INDEX,
    CF_VERSIONS,
    CF_ACTIVE_VERSIONS,
    CF_RANK_SAMPLES,
    CF_KEYWORDS,
    CF_KEYWORD_SAMPLES,
];

/// Options for append-only time series (compressed)
fn series_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_ENTITIES, Options::default()),
        ColumnFamilyDescriptor::new(CF_JOBS, Options::default()),
        ColumnFamilyDescriptor::new(CF_JOB_INDEX, Options::default()),
        ColumnFamilyDescriptor::new(CF_VERSIONS, Options::default()),
        ColumnFamilyDescriptor::new(CF_ACTIVE_VERSIONS, Options::default()),
        ColumnFamilyDescriptor::new(CF_RANK_SAMPLES, series_options()),
        ColumnFamilyDescriptor::new(CF_KEYWORDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_KEYWORD_SAMPLES, series_options()),
    ]
}
