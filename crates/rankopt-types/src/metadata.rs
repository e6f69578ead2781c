//! Video metadata snapshot (title, tags, description).

use serde::{Deserialize, Serialize};

/// The mutable, externally visible metadata of a tracked video.
///
/// This is what the generator proposes and the applier writes back to the
/// ranking provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metadata {
    pub title: String,

    /// Ordered tag list; order is preserved as supplied.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl Metadata {
    pub fn new(
        title: impl Into<String>,
        tags: Vec<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            tags,
            description: description.into(),
        }
    }

    /// True when the proposal carries no usable title.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty()
    }
}
