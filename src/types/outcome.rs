//! Tagged results for the public save/load/verify surface.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::Confirmation;
use super::version::VersionMeta;
use super::word::Word;
use crate::diff::Op;

/// Everything the editor needs to open a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedDocument {
    pub doc: String,
    pub version: u32,
    pub base_sha256: String,
    pub text: String,
    pub words: Vec<Word>,
    pub confirmations: Vec<Confirmation>,
}

/// A save request as the editor submits it.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub doc: String,
    pub text: String,
    /// Version the client edited on top of; `None` for the first save.
    pub parent_version: Option<u32>,
    /// Hash of the parent's canonical text as the client last saw it.
    pub expected_base_sha256: Option<String>,
    /// Client tokens, if the editor tracked them; timings are carried over
    /// from the previous version wherever payloads still match.
    pub words: Vec<Word>,
    /// Segment the caret was in, used to centre the background alignment
    /// window. `None` skips alignment.
    pub caret_segment: Option<u32>,
    /// Alignment neighbour window radius, clamped to `[0, 3]`.
    pub neighbors: u32,
    pub created_by: String,
}

impl SaveRequest {
    #[must_use]
    pub fn new(doc: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            text: text.into(),
            parent_version: None,
            expected_base_sha256: None,
            words: Vec::new(),
            caret_segment: None,
            neighbors: 1,
            created_by: String::new(),
        }
    }

    #[must_use]
    pub fn on_parent(mut self, version: u32, base_sha256: impl Into<String>) -> Self {
        self.parent_version = Some(version);
        self.expected_base_sha256 = Some(base_sha256.into());
        self
    }

    #[must_use]
    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = words;
        self
    }

    #[must_use]
    pub fn at_segment(mut self, segment: u32) -> Self {
        self.caret_segment = Some(segment);
        self
    }
}

/// Result of a save.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved(SavedVersion),
    /// The canonical text already matches the client's baseline hash.
    NoChange,
    Conflict(Box<ConflictInfo>),
}

impl SaveOutcome {
    #[must_use]
    pub fn saved(&self) -> Option<&SavedVersion> {
        match self {
            Self::Saved(saved) => Some(saved),
            _ => None,
        }
    }
}

/// A committed save.
#[derive(Debug, Clone)]
pub struct SavedVersion {
    pub version: u32,
    pub base_sha256: String,
    /// Chain verification ran after commit; its outcome rides along.
    pub verify: VerifyOutcome,
    /// Set when incoming timings were rejected; the text is durable but the
    /// stored timings are the previously aligned values.
    pub timing_alert: Option<TimingAlert>,
}

/// Why incoming word timings were discarded on an otherwise successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingAlert {
    /// A start/end carried the sentinel `999999999…` fill value.
    FakeTiming,
    /// Inverted or non-monotonic timings beyond tolerance.
    InvalidTiming,
}

/// Why a save was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// A parent version was supplied on a first save.
    InvalidParentForFirst,
    /// The document has versions but the client did not name its parent.
    MissingParent,
    /// The client named a parent but sent no expected hash.
    HashMissing,
    /// The store has moved past the client's parent version.
    VersionConflict,
    /// Parent version matches but the expected hash does not.
    HashConflict,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::InvalidParentForFirst => "invalid_parent_for_first",
            Self::MissingParent => "missing_parent",
            Self::HashMissing => "hash_missing",
            Self::VersionConflict => "version_conflict",
            Self::HashConflict => "hash_conflict",
        };
        f.write_str(tag)
    }
}

/// Structured conflict payload handed to the editor's merge dialog.
///
/// `diff_parent_to_latest` and `diff_parent_to_client` are the two edit
/// streams against the common ancestor; when they touch disjoint ranges the
/// editor can compose them with [`crate::diff::edits::auto_merge`] and
/// retry on top of `latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub reason: ConflictReason,
    pub latest: Option<VersionMeta>,
    pub latest_text: Option<String>,
    pub parent: Option<VersionMeta>,
    pub parent_text: Option<String>,
    #[serde(default)]
    pub diff_parent_to_latest: Vec<Op>,
    #[serde(default)]
    pub diff_parent_to_client: Vec<Op>,
}

/// Result of replaying the edit chain.
///
/// Verification failures are data, not errors: a save that committed still
/// reports them, and the editor maps them onto a diagnostic dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// The document has no versions yet.
    NoVersion,
    /// Replay reproduced the latest hash.
    Ok { base_sha256: String },
    /// Versions exist but version 1 is gone.
    MissingV1,
    /// An edit record's ops failed to parse.
    BadOps { at: u32, reason: String },
    /// An edit record does not reproduce its parent text.
    OpsMismatchParent { at: u32 },
    /// Replay finished but the final hash differs from the stored one.
    HashMismatch { expected: String, got: String },
}

impl VerifyOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. } | Self::NoVersion)
    }
}
