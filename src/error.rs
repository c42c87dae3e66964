//! Engine error taxonomy.
//!
//! Every public operation returns `Result<T>`; recoverable conditions that
//! the caller is expected to act on (conflicts, verification outcomes) are
//! tagged variants rather than stringly payloads.

use thiserror::Error;

use crate::types::ConflictInfo;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The save lost the race: the store holds a newer version or a
    /// different hash than the client's baseline.
    #[error("save conflict ({})", .0.reason)]
    Conflict(Box<ConflictInfo>),

    #[error("hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: String, got: String },

    #[error("edit record at child version {at} has malformed ops: {reason}")]
    BadOps { at: u32, reason: String },

    #[error("edit record at child version {at} does not reproduce its parent text")]
    OpsMismatchParent { at: u32 },

    #[error("document has versions but version 1 is missing")]
    MissingV1,

    #[error("document or version not found: {doc} v{version}")]
    VersionNotFound { doc: String, version: u32 },

    #[error("transient backend failure: {reason}")]
    TransientBackend { reason: String },

    #[error("invalid timing: {reason}")]
    InvalidTiming { reason: String },

    #[error("fake timing value {value} on word index {index}")]
    FakeTiming { index: usize, value: f64 },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("journal corruption at offset {offset}: {reason}")]
    JournalCorruption { offset: u64, reason: String },

    #[error("lock: {0}")]
    Lock(String),

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the retry combinator may re-issue the failed operation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBackend { .. } | Self::Lock(_))
    }

    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}
