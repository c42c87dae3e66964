//! Typed change notifications published on the engine bus.

use serde::{Deserialize, Serialize};

/// What a background alignment pass did for one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignStatus {
    /// Timings were updated; `changed` words moved beyond tolerance.
    Applied { changed: usize, compared: usize },
    /// The window had no usable anchors, nothing was changed.
    Skipped { reason: String },
    /// The realigned words failed validation; stored timings were kept.
    Rejected { reason: String },
}

/// Engine change notifications.
///
/// Observers subscribe through [`crate::bus::EventBus`] and receive every
/// variant; matching on the enum replaces string-tag dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A new version was committed.
    VersionChanged {
        doc: String,
        version: u32,
        base_sha256: String,
    },
    /// A version's word sequence was replaced (alignment or migration).
    TokensUpdated { doc: String, version: u32 },
    /// The confirmation set for a version was replaced.
    ConfirmationsChanged {
        doc: String,
        version: u32,
        count: usize,
    },
    /// A background alignment pass finished.
    AlignmentFinished {
        doc: String,
        version: u32,
        status: AlignStatus,
    },
}

impl ChangeEvent {
    /// Document the event concerns.
    #[must_use]
    pub fn doc(&self) -> &str {
        match self {
            Self::VersionChanged { doc, .. }
            | Self::TokensUpdated { doc, .. }
            | Self::ConfirmationsChanged { doc, .. }
            | Self::AlignmentFinished { doc, .. } => doc,
        }
    }
}
