//! Deterministic, invertible diff engine.
//!
//! [`diff`] produces an edit script between two canonical strings as a flat
//! list of [`Op`]s. The engine runs a cascade of strategies, each validated
//! by a double round-trip before being accepted:
//!
//! 1. line anchoring with a word-token refinement of the changed middle,
//! 2. trimmed character-level Myers over the whole text,
//! 3. word-granular Myers over the whole text,
//! 4. the last-resort `[delete everything, insert everything]` script.
//!
//! Output is normalized (no empty payloads, adjacent same-kind ops merged)
//! and byte-identical across invocations for the same inputs.

pub mod edits;
mod myers;
mod refine;

pub(crate) use myers::diff_slices as myers_runs;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::constants::DIFF_TIME_BUDGET;
use crate::text::canonicalize;

pub use edits::{apply_edits, auto_merge, overlaps, to_edits, Edit, MergeOutcome};

/// Edit operation kind; the persisted wire code is `-1/0/+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Delete,
    Equal,
    Insert,
}

impl OpKind {
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::Delete => -1,
            Self::Equal => 0,
            Self::Insert => 1,
        }
    }
}

/// One diff operation: an op code and its text payload.
///
/// Serialized as the `(code, payload)` pair used by the persisted edit
/// records, e.g. `[-1, "removed"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(i8, String)", into = "(i8, String)")]
pub struct Op {
    pub kind: OpKind,
    pub text: String,
}

impl Op {
    #[must_use]
    pub fn delete(text: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Delete,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn equal(text: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Equal,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Insert,
            text: text.into(),
        }
    }
}

impl From<Op> for (i8, String) {
    fn from(op: Op) -> Self {
        (op.kind.code(), op.text)
    }
}

impl TryFrom<(i8, String)> for Op {
    type Error = String;

    fn try_from((code, text): (i8, String)) -> Result<Self, Self::Error> {
        let kind = match code {
            -1 => OpKind::Delete,
            0 => OpKind::Equal,
            1 => OpKind::Insert,
            other => return Err(format!("unknown op code {other}")),
        };
        Ok(Self { kind, text })
    }
}

/// Concatenation of every non-insert payload: the parent text.
#[must_use]
pub fn reconstruct_old(ops: &[Op]) -> String {
    ops.iter()
        .filter(|op| op.kind != OpKind::Insert)
        .map(|op| op.text.as_str())
        .collect()
}

/// Concatenation of every non-delete payload: the child text.
#[must_use]
pub fn reconstruct_new(ops: &[Op]) -> String {
    ops.iter()
        .filter(|op| op.kind != OpKind::Delete)
        .map(|op| op.text.as_str())
        .collect()
}

/// Both round trips must hold for an op script to be accepted.
#[must_use]
pub fn round_trips(ops: &[Op], old: &str, new: &str) -> bool {
    reconstruct_old(ops) == old && reconstruct_new(ops) == new
}

/// Merge adjacent same-kind ops and drop empty payloads.
#[must_use]
pub fn normalize_ops(ops: Vec<Op>) -> Vec<Op> {
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());
    for op in ops {
        if op.text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.kind == op.kind => last.text.push_str(&op.text),
            _ => out.push(op),
        }
    }
    out
}

/// Cooperative wall-clock budget shared by every strategy in one diff call.
#[derive(Debug, Clone)]
pub(crate) struct DiffBudget {
    started: Instant,
    limit: Duration,
}

impl DiffBudget {
    pub(crate) fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.started.elapsed() >= self.limit
    }
}

/// Diff two strings after canonicalizing both.
#[must_use]
pub fn diff(a: &str, b: &str) -> Vec<Op> {
    let a = canonicalize(a);
    let b = canonicalize(b);
    diff_canonical(&a, &b)
}

/// Diff two already-canonical strings.
///
/// The returned script always round-trips; callers relying on that do not
/// need to re-validate.
#[must_use]
pub fn diff_canonical(a: &str, b: &str) -> Vec<Op> {
    if a == b {
        return if a.is_empty() {
            Vec::new()
        } else {
            vec![Op::equal(a)]
        };
    }

    let budget = DiffBudget::start(DIFF_TIME_BUDGET);

    if let Some(ops) = refine::line_anchor_diff(a, b, &budget) {
        let ops = normalize_ops(ops);
        if round_trips(&ops, a, b) {
            return ops;
        }
        tracing::warn!(diff.stage = "line_anchor", "diff stage failed round-trip");
    }

    if let Some(ops) = refine::trimmed_char_diff(a, b, &budget) {
        let ops = normalize_ops(ops);
        if round_trips(&ops, a, b) {
            return ops;
        }
        tracing::warn!(diff.stage = "char", "diff stage failed round-trip");
    }

    if let Some(ops) = refine::word_diff(a, b, &budget) {
        let ops = normalize_ops(ops);
        if round_trips(&ops, a, b) {
            return ops;
        }
        tracing::warn!(diff.stage = "word", "diff stage failed round-trip");
    }

    // Last resort: always correct, never pretty.
    normalize_ops(vec![Op::delete(a), Op::insert(b)])
}
