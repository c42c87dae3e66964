//! Persisted edit and confirmation records.

use serde::{Deserialize, Serialize};

use crate::diff::Op;

/// The delta taking `parent_version` to `child_version`.
///
/// `text_ops` is the invertible edit script: replaying the non-insert
/// payloads reproduces the parent text, the non-delete payloads the child
/// text. `timing_ops` is appended after background alignment runs and holds
/// the per-word time adjustments that alignment applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub parent_version: u32,
    pub child_version: u32,
    pub text_ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_ops: Option<Vec<TimingBlock>>,
}

/// Per-word time adjustments over one segment neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingBlock {
    pub segment_start: u32,
    pub segment_end: u32,
    pub items: Vec<TimingDelta>,
}

impl TimingBlock {
    /// Number of items whose start or end moved beyond tolerance.
    #[must_use]
    pub fn changed_count(&self, epsilon: f64) -> usize {
        self.items
            .iter()
            .filter(|d| d.delta_start.abs() > epsilon || d.delta_end.abs() > epsilon)
            .count()
    }
}

/// One word's before/after timing inside a [`TimingBlock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingDelta {
    pub word: String,
    pub old_start: f64,
    pub new_start: f64,
    pub old_end: f64,
    pub new_end: f64,
    pub delta_start: f64,
    pub delta_end: f64,
}

impl TimingDelta {
    #[must_use]
    pub fn new(word: impl Into<String>, old: (f64, f64), new: (f64, f64)) -> Self {
        Self {
            word: word.into(),
            old_start: old.0,
            new_start: new.0,
            old_end: old.1,
            new_end: new.1,
            delta_start: new.0 - old.0,
            delta_end: new.1 - old.1,
        }
    }
}

/// A reviewer-confirmed character range anchored to one version.
///
/// `prefix`/`exact`/`suffix` carry enough context to re-locate the range on
/// a later version's text; the confirmation itself is valid only while the
/// document hash still equals `base_sha256`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub start_offset: u32,
    pub end_offset: u32,
    pub prefix: String,
    pub exact: String,
    pub suffix: String,
    pub base_sha256: String,
}
