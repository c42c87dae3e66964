//! Positional edits: converting op scripts into splice operations,
//! overlap detection, application, and the two-stream auto-merge.
//!
//! Offsets are character indices into the base text, matching the
//! confirmation anchors; they are converted to byte offsets only at splice
//! time.

use super::{diff_canonical, Op, OpKind};
use crate::text::canonicalize;

/// A splice against a base text: replace characters `[start, end)` with
/// `ins`. Pure insertions have `start == end`; pure deletions empty `ins`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub ins: String,
}

impl Edit {
    #[must_use]
    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }
}

/// Convert an op script into positional edits against its base text.
///
/// Walks ops left to right with a character cursor: a delete opens a pending
/// replacement, a following insert fills its replacement text, and an equal
/// run (or the end of the stream) flushes it. A bare insert becomes a pure
/// insertion at the cursor.
#[must_use]
pub fn to_edits(ops: &[Op]) -> Vec<Edit> {
    let mut edits: Vec<Edit> = Vec::new();
    let mut pos = 0usize;
    let mut pending: Option<Edit> = None;

    for op in ops {
        let len = op.text.chars().count();
        match op.kind {
            OpKind::Equal => {
                if let Some(edit) = pending.take() {
                    edits.push(edit);
                }
                pos += len;
            }
            OpKind::Delete => {
                if let Some(edit) = pending.take() {
                    edits.push(edit);
                }
                pending = Some(Edit {
                    start: pos,
                    end: pos + len,
                    ins: String::new(),
                });
                pos += len;
            }
            OpKind::Insert => {
                if let Some(mut edit) = pending.take() {
                    edit.ins = op.text.clone();
                    edits.push(edit);
                } else {
                    edits.push(Edit {
                        start: pos,
                        end: pos,
                        ins: op.text.clone(),
                    });
                }
            }
        }
    }
    if let Some(edit) = pending.take() {
        edits.push(edit);
    }
    edits
}

/// Whether two edits against the same base collide.
///
/// Two pure insertions collide only at the same position; an insertion
/// collides with a replacement when it lands inside `[start, end)`; two
/// replacements collide when their ranges strictly intersect.
#[must_use]
pub fn overlaps(a: &Edit, b: &Edit) -> bool {
    match (a.is_insertion(), b.is_insertion()) {
        (true, true) => a.start == b.start,
        (true, false) => a.start >= b.start && a.start < b.end,
        (false, true) => b.start >= a.start && b.start < a.end,
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

/// Apply edits to a base text.
///
/// Edits are sorted by start descending (larger end first on ties) so every
/// splice happens at still-valid positions. Offsets beyond the text are
/// clamped; well-formed edits derived from a valid op script never are.
#[must_use]
pub fn apply_edits(base: &str, edits: &[Edit]) -> String {
    let byte_at: Vec<usize> = base
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(base.len()))
        .collect();
    let char_len = byte_at.len() - 1;

    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by(|x, y| y.start.cmp(&x.start).then(y.end.cmp(&x.end)));

    let mut out = base.to_string();
    for edit in ordered {
        let start = edit.start.min(char_len);
        let end = edit.end.clamp(start, char_len);
        out.replace_range(byte_at[start]..byte_at[end], &edit.ins);
    }
    out
}

/// Outcome of composing two edit streams over a common ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { text: String },
    /// At least one pair of edits collides; the pairs are reported in
    /// `(latest, client)` order for the merge dialog.
    Unmergeable { conflicts: Vec<(Edit, Edit)> },
}

/// Compose the edits `base -> latest` with the edits `base -> mine`.
///
/// Identical edits appearing in both streams count once; any other overlap
/// makes the pair unmergeable. When all edits are disjoint the union applied
/// to the base equals applying either stream after the other.
#[must_use]
pub fn auto_merge(base: &str, latest: &str, mine: &str) -> MergeOutcome {
    let base = canonicalize(base);
    let latest = canonicalize(latest);
    let mine = canonicalize(mine);

    let edits_latest = to_edits(&diff_canonical(&base, &latest));
    let edits_mine = to_edits(&diff_canonical(&base, &mine));

    let mut conflicts: Vec<(Edit, Edit)> = Vec::new();
    let mut merged: Vec<Edit> = edits_latest.clone();
    for mine_edit in &edits_mine {
        if edits_latest.contains(mine_edit) {
            continue;
        }
        for latest_edit in &edits_latest {
            if overlaps(latest_edit, mine_edit) {
                conflicts.push((latest_edit.clone(), mine_edit.clone()));
            }
        }
        merged.push(mine_edit.clone());
    }

    if conflicts.is_empty() {
        MergeOutcome::Merged {
            text: apply_edits(&base, &merged),
        }
    } else {
        MergeOutcome::Unmergeable { conflicts }
    }
}
