//! Immutable version snapshots.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::word::Word;

/// An immutable snapshot of a document at a monotonic integer index.
///
/// `base_sha256` is the SHA-256 of the canonical text and is the anchor for
/// both conflict detection and chain verification. Versions are created only
/// by the save path and never mutated; alignment replaces the word sequence
/// through a dedicated store record, leaving `text`/`base_sha256` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version: u32,
    pub base_sha256: String,
    pub text: String,
    pub words: Vec<Word>,
    #[serde(default)]
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Version {
    #[must_use]
    pub fn meta(&self) -> VersionMeta {
        VersionMeta {
            version: self.version,
            parent_version: self.version.saturating_sub(1),
            base_sha256: self.base_sha256.clone(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }
}

/// History row: everything about a version except its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: u32,
    pub parent_version: u32,
    pub base_sha256: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
