//! Key encoding and decoding for storage layer.
//!
//! Record keys are `{prefix}:{id}`. Versioned and time-series keys append
//! zero-padded numbers so lexicographic order matches numeric order:
//! - `ver:{job_id}:{version:010}`
//! - `rank:{job_id}:{timestamp_ms:013}:{ulid}`
//! - `kwrank:{keyword_id}:{timestamp_ms:013}:{ulid}`
//!
//! Entity ids never contain `:` (validated on entry), so per-entity and
//! per-job prefixes cannot collide.

use ulid::Ulid;

use crate::error::StorageError;

/// Key for a tracked entity
/// Format: ent:{entity_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKey<'a>(pub &'a str);

impl EntityKey<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("ent:{}", self.0).into_bytes()
    }
}

/// Key for an optimization job
/// Format: job:{job_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey<'a>(pub &'a str);

impl JobKey<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("job:{}", self.0).into_bytes()
    }
}

/// Key for the entity -> job lookup
/// Format: entity:{entity_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIndexKey<'a>(pub &'a str);

impl JobIndexKey<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("entity:{}", self.0).into_bytes()
    }
}

/// Key for the active version pointer of a job
/// Format: active:{job_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVersionKey<'a>(pub &'a str);

impl ActiveVersionKey<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("active:{}", self.0).into_bytes()
    }
}

/// Key for an optimization version
/// Format: ver:{job_id}:{version:010}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey {
    pub job_id: String,
    pub version: u32,
}

impl VersionKey {
    pub fn new(job_id: impl Into<String>, version: u32) -> Self {
        Self {
            job_id: job_id.into(),
            version,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("ver:{}:{:010}", self.job_id, self.version).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "ver" {
            return Err(StorageError::Key(format!("Invalid version key format: {}", s)));
        }

        let version: u32 = parts[2]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid version: {}", e)))?;

        Ok(Self {
            job_id: parts[1].to_string(),
            version,
        })
    }

    /// Prefix covering every version of a job
    pub fn prefix(job_id: &str) -> Vec<u8> {
        format!("ver:{}:", job_id).into_bytes()
    }
}

/// Key for a topic rank sample
/// Format: rank:{job_id}:{timestamp_ms:013}:{ulid}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankSampleKey {
    pub job_id: String,
    pub timestamp_ms: i64,
    pub ulid: Ulid,
}

impl RankSampleKey {
    /// Create a key with a fresh ULID for uniqueness within the same millisecond
    pub fn new(job_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp_ms,
            ulid: Ulid::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("rank:{}:{:013}:{}", self.job_id, self.timestamp_ms, self.ulid).into_bytes()
    }

    /// Prefix covering every sample of a job
    pub fn prefix(job_id: &str) -> Vec<u8> {
        format!("rank:{}:", job_id).into_bytes()
    }
}

/// Key for a tracked keyword
/// Format: kw:{entity_id}:{keyword}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordKey<'a> {
    pub entity_id: &'a str,
    pub keyword: &'a str,
}

impl<'a> KeywordKey<'a> {
    pub fn new(entity_id: &'a str, keyword: &'a str) -> Self {
        Self { entity_id, keyword }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("kw:{}:{}", self.entity_id, self.keyword).into_bytes()
    }

    /// Prefix covering every keyword of an entity
    pub fn prefix(entity_id: &str) -> Vec<u8> {
        format!("kw:{}:", entity_id).into_bytes()
    }
}

/// Key for a keyword rank sample
/// Format: kwrank:{keyword_id}:{timestamp_ms:013}:{ulid}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSampleKey {
    pub keyword_id: String,
    pub timestamp_ms: i64,
    pub ulid: Ulid,
}

impl KeywordSampleKey {
    pub fn new(keyword_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            keyword_id: keyword_id.into(),
            timestamp_ms,
            ulid: Ulid::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "kwrank:{}:{:013}:{}",
            self.keyword_id, self.timestamp_ms, self.ulid
        )
        .into_bytes()
    }

    /// Prefix covering every sample of a keyword
    pub fn prefix(keyword_id: &str) -> Vec<u8> {
        format!("kwrank:{}:", keyword_id).into_bytes()
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// All prefixes end in `:`; bumping the last byte gives the exclusive bound.
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut bound = prefix.to_vec();
    if let Some(last) = bound.last_mut() {
        *last = last.saturating_add(1);
    }
    bound
}
