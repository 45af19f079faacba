use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing one backup artifact held by the backup gateway.
///
/// Artifact identifiers are owned by the gateway and treated as opaque
/// strings here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Gateway-assigned artifact identifier.
    pub id: String,
    /// Artifact name as produced by the gateway.
    pub name: String,
    /// Artifact kind (e.g. `"full"`).
    pub kind: String,
    /// Size on storage in bytes.
    pub size_bytes: u64,
    /// Creation timestamp in UTC.
    pub created_at: DateTime<Utc>,
    /// Tags attached at creation; schedule-produced artifacts carry
    /// `schedule:{id}`.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ArtifactMeta {
    /// True when the artifact carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
