//! Timing re-alignment.
//!
//! After a text edit, surviving words keep their audio timings and new words
//! get times interpolated between the nearest surviving anchors. The pass is
//! pure: it consumes the previous version's timed words plus the new text and
//! produces a full word sequence and the [`TimingBlock`]s persisted alongside
//! the edit record.

mod carry;

use std::ops::Range;

use crate::constants::{
    DIFF_TIME_BUDGET, MAX_ALIGN_NEIGHBORS, MIN_WORD_DURATION, TIMING_EPSILON,
};
use crate::diff::{self, OpKind};
use crate::error::{EngineError, Result};
use crate::text::tokenize_to_words;
use crate::types::{AlignStatus, TimingBlock, TimingDelta, Word};

pub use carry::{carry_over_timings, normalize_segment_durations};

/// Output of a full-text re-alignment.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub words: Vec<Word>,
    pub blocks: Vec<TimingBlock>,
    /// Lexical tokens whose start or end moved beyond tolerance.
    pub changed: usize,
    /// Lexical tokens carrying timings after the pass.
    pub compared: usize,
}

/// Output of a windowed re-alignment over a full word sequence.
#[derive(Debug, Clone)]
pub struct WindowAlignment {
    /// The complete updated word sequence for the version.
    pub words: Vec<Word>,
    pub blocks: Vec<TimingBlock>,
    pub status: AlignStatus,
}

/// Clamp the neighbour radius to the supported window.
#[must_use]
pub fn clamp_neighbors(neighbors: u32) -> u32 {
    neighbors.min(MAX_ALIGN_NEIGHBORS)
}

/// Sentinel fill values produced by some ASR exports: any timing whose
/// decimal form begins with nine nines and at least one further digit.
#[must_use]
pub fn is_fake_timing(value: f64) -> bool {
    if !value.is_finite() {
        return false;
    }
    let digits = format!("{:.0}", value.abs().trunc());
    digits.len() >= 10 && digits.starts_with("999999999")
}

/// Reject word sequences the store must never persist: fake sentinel
/// timings, inverted ranges, and non-monotonic starts beyond tolerance.
pub fn validate_words(words: &[Word]) -> Result<()> {
    let mut prev_end: Option<f64> = None;
    for (index, token) in words.iter().enumerate() {
        for value in [token.start, token.end].into_iter().flatten() {
            if is_fake_timing(value) {
                return Err(EngineError::FakeTiming { index, value });
            }
        }
        if token.is_newline() {
            continue;
        }
        if let (Some(start), Some(end)) = (token.start, token.end) {
            if end < start {
                return Err(EngineError::InvalidTiming {
                    reason: format!("end {end} precedes start {start} at word {index}"),
                });
            }
        }
        if let (Some(start), Some(previous)) = (token.start, prev_end) {
            if start < previous - TIMING_EPSILON {
                return Err(EngineError::InvalidTiming {
                    reason: format!(
                        "start {start} at word {index} regresses past previous end {previous}"
                    ),
                });
            }
        }
        if let Some(end) = token.end {
            prev_end = Some(end);
        }
    }
    Ok(())
}

/// Re-derive timings for `new_text` from a timed baseline sequence.
#[must_use]
pub fn realign(baseline: &[Word], new_text: &str) -> Alignment {
    let base = normalize_whitespace_anchors(baseline);
    let mut out = tokenize_to_words(new_text);

    // LCS over token payloads; equal runs are the kept anchors.
    let base_keys: Vec<&str> = base.iter().map(|w| w.word.as_str()).collect();
    let out_keys: Vec<&str> = out.iter().map(|w| w.word.as_str()).collect();
    let budget = diff::DiffBudget::start(DIFF_TIME_BUDGET);
    let Some(runs) = diff::myers_runs(&base_keys, &out_keys, &budget) else {
        return Alignment {
            words: out,
            blocks: Vec::new(),
            changed: 0,
            compared: 0,
        };
    };

    // slot[i] = index into `base` when out[i] survived the edit.
    let mut slot: Vec<Option<usize>> = vec![None; out.len()];
    for run in &runs {
        if run.kind == OpKind::Equal {
            for offset in 0..run.a.len() {
                slot[run.b.start + offset] = Some(run.a.start + offset);
            }
        }
    }

    for (i, token) in out.iter_mut().enumerate() {
        if let Some(base_idx) = slot[i] {
            token.start = base[base_idx].start;
            token.end = base[base_idx].end;
            token.probability = base[base_idx].probability;
        }
    }

    fill_inserted_clusters(&mut out, &slot);
    monotonise(&mut out);

    let (blocks, changed, compared) = build_blocks(&base, &out, &slot);
    Alignment {
        words: out,
        blocks,
        changed,
        compared,
    }
}

/// Re-align only the segments around `seg_hint`, splicing the result back
/// into the current full word sequence.
///
/// `baseline` is the previous version's word sequence (the timing source),
/// `current` the freshly saved version's sequence. Returns the full updated
/// sequence plus the window's timing blocks.
#[must_use]
pub fn realign_window(
    baseline: &[Word],
    current: &[Word],
    seg_hint: u32,
    neighbors: u32,
) -> WindowAlignment {
    let radius = clamp_neighbors(neighbors);
    let start_seg = seg_hint.saturating_sub(radius);
    let end_seg = seg_hint + radius;

    let base_range = segment_token_range(baseline, start_seg, end_seg);
    let cur_range = segment_token_range(current, start_seg, end_seg);
    let base_window = &baseline[base_range];

    let has_anchor = base_window
        .iter()
        .any(|w| w.is_lexical() && w.start.is_some() && w.end.is_some());
    if !has_anchor {
        return WindowAlignment {
            words: current.to_vec(),
            blocks: Vec::new(),
            status: AlignStatus::Skipped {
                reason: "no timed anchors in window".into(),
            },
        };
    }

    let window_text = crate::types::compose_text(&current[cur_range.clone()]);
    if window_text.trim().is_empty() {
        return WindowAlignment {
            words: current.to_vec(),
            blocks: Vec::new(),
            status: AlignStatus::Skipped {
                reason: "empty window".into(),
            },
        };
    }

    let aligned = realign(base_window, &window_text);

    let mut words = current.to_vec();
    words.splice(cur_range, aligned.words);
    if let Err(err) = validate_words(&words) {
        tracing::warn!(error = %err, "window alignment produced invalid timings, keeping stored words");
        return WindowAlignment {
            words: current.to_vec(),
            blocks: Vec::new(),
            status: AlignStatus::Rejected {
                reason: err.to_string(),
            },
        };
    }

    // Window-relative segment indices shift to document coordinates.
    let blocks: Vec<TimingBlock> = aligned
        .blocks
        .into_iter()
        .map(|block| TimingBlock {
            segment_start: block.segment_start + start_seg,
            segment_end: block.segment_end + start_seg,
            items: block.items,
        })
        .collect();

    WindowAlignment {
        words,
        blocks,
        status: AlignStatus::Applied {
            changed: aligned.changed,
            compared: aligned.compared,
        },
    }
}

/// Token index range covering segments `[start_seg, end_seg]`, excluding the
/// separators on either side of the window but keeping internal ones.
pub(crate) fn segment_token_range(words: &[Word], start_seg: u32, end_seg: u32) -> Range<usize> {
    let mut seg = 0u32;
    let mut start: Option<usize> = None;
    let mut end = 0usize;
    for (i, token) in words.iter().enumerate() {
        let in_window =
            seg >= start_seg && seg <= end_seg && !(token.is_newline() && seg == end_seg);
        if in_window {
            if start.is_none() {
                start = Some(i);
            }
            end = i + 1;
        }
        if token.is_newline() {
            seg += 1;
            if seg > end_seg {
                break;
            }
        }
    }
    start.unwrap_or(end)..end
}

/// Whitespace runs become zero-length anchors at the midpoint of their span,
/// so they never stretch the fill window for inserted words.
fn normalize_whitespace_anchors(baseline: &[Word]) -> Vec<Word> {
    baseline
        .iter()
        .map(|token| {
            if token.is_space_run() {
                if let (Some(start), Some(end)) = (token.start, token.end) {
                    let mid = (start + end) / 2.0;
                    let mut anchored = token.clone();
                    anchored.start = Some(mid);
                    anchored.end = Some(mid);
                    return anchored;
                }
            }
            token.clone()
        })
        .collect()
}

/// Assign times to every maximal run of inserted tokens from the nearest
/// kept anchors on each side. Newlines bound the anchor search.
fn fill_inserted_clusters(out: &mut [Word], slot: &[Option<usize>]) {
    let mut i = 0;
    while i < out.len() {
        if slot[i].is_some() || out[i].is_newline() {
            i += 1;
            continue;
        }
        let cluster_start = i;
        let mut cluster_end = i;
        while cluster_end < out.len() && slot[cluster_end].is_none() && !out[cluster_end].is_newline()
        {
            cluster_end += 1;
        }

        let left = anchor_end_before(out, slot, cluster_start);
        let right = anchor_start_after(out, slot, cluster_end);
        fill_cluster(&mut out[cluster_start..cluster_end], left, right);

        i = cluster_end;
    }
}

fn anchor_end_before(out: &[Word], slot: &[Option<usize>], idx: usize) -> Option<f64> {
    for i in (0..idx).rev() {
        if out[i].is_newline() {
            return None;
        }
        if slot[i].is_some() {
            if let Some(end) = out[i].end.or(out[i].start) {
                return Some(end);
            }
        }
    }
    None
}

fn anchor_start_after(out: &[Word], slot: &[Option<usize>], idx: usize) -> Option<f64> {
    for i in idx..out.len() {
        if out[i].is_newline() {
            return None;
        }
        if slot[i].is_some() {
            if let Some(start) = out[i].start.or(out[i].end) {
                return Some(start);
            }
        }
    }
    None
}

fn fill_cluster(cluster: &mut [Word], left: Option<f64>, right: Option<f64>) {
    let word_count = cluster.iter().filter(|w| w.is_lexical()).count();

    if word_count == 0 {
        // Whitespace-only insertion collapses to a single mid-window anchor.
        if let (Some(l), Some(r)) = (left, right) {
            let mid = (l + r.max(l)) / 2.0;
            for token in cluster.iter_mut() {
                token.start = Some(mid);
                token.end = Some(mid);
            }
        }
        return;
    }

    let needed = word_count as f64 * (MIN_WORD_DURATION + TIMING_EPSILON);
    let (window_start, window_end) = match (left, right) {
        (Some(l), Some(r)) => (l, r.max(l)),
        (Some(l), None) => (l, l + needed),
        (None, Some(r)) => ((r - needed).max(0.0), r),
        (None, None) => return,
    };

    let span = (window_end - window_start).max(0.0);
    let spacing = TIMING_EPSILON * (word_count.saturating_sub(1)) as f64;
    let duration = ((span - spacing) / word_count as f64).max(MIN_WORD_DURATION);

    let mut cursor = window_start;
    for token in cluster.iter_mut() {
        if token.is_lexical() {
            token.start = Some(cursor);
            token.end = Some(cursor + duration);
            cursor += duration + TIMING_EPSILON;
        } else {
            token.start = Some(cursor);
            token.end = Some(cursor);
        }
    }
}

/// Left-to-right repair pass: starts never regress, lexical tokens keep a
/// minimum duration.
pub(crate) fn monotonise(words: &mut [Word]) {
    let mut prev_end: Option<f64> = None;
    for token in words.iter_mut() {
        if token.is_newline() {
            continue;
        }
        let Some(mut start) = token.start else {
            continue;
        };
        if let Some(previous) = prev_end {
            if start < previous {
                start = previous;
            }
        }
        let mut end = token.end.unwrap_or(start);
        let floor = if token.is_lexical() {
            start + MIN_WORD_DURATION
        } else {
            start
        };
        if end < floor {
            end = floor;
        }
        token.start = Some(start);
        token.end = Some(end);
        prev_end = Some(end);
    }
}

/// Group per-word deltas into one block per contiguous run of changed
/// segments.
fn build_blocks(
    base: &[Word],
    out: &[Word],
    slot: &[Option<usize>],
) -> (Vec<TimingBlock>, usize, usize) {
    let mut changed_total = 0usize;
    let mut compared = 0usize;

    // (segment, delta, beyond_tolerance) per lexical token.
    let mut rows: Vec<(u32, TimingDelta, bool)> = Vec::new();
    let mut seg = 0u32;
    for (i, token) in out.iter().enumerate() {
        if token.is_newline() {
            seg += 1;
            continue;
        }
        if !token.is_lexical() {
            continue;
        }
        let new_start = token.start.unwrap_or(0.0);
        let new_end = token.end.unwrap_or(new_start);
        let (old_start, old_end) = match slot[i] {
            Some(base_idx) => (
                base[base_idx].start.unwrap_or(0.0),
                base[base_idx].end.unwrap_or(0.0),
            ),
            None => (0.0, 0.0),
        };
        if token.has_timing() {
            compared += 1;
        }
        let delta = TimingDelta::new(token.word.clone(), (old_start, old_end), (new_start, new_end));
        let moved = slot[i].is_none()
            || delta.delta_start.abs() > TIMING_EPSILON
            || delta.delta_end.abs() > TIMING_EPSILON;
        if moved {
            changed_total += 1;
        }
        rows.push((seg, delta, moved));
    }

    let changed_segments: Vec<u32> = {
        let mut segs: Vec<u32> = rows
            .iter()
            .filter(|(_, _, moved)| *moved)
            .map(|(seg, _, _)| *seg)
            .collect();
        segs.dedup();
        segs
    };

    let mut blocks: Vec<TimingBlock> = Vec::new();
    for seg_idx in changed_segments {
        match blocks.last_mut() {
            Some(block) if block.segment_end + 1 >= seg_idx => {
                block.segment_end = block.segment_end.max(seg_idx);
            }
            _ => blocks.push(TimingBlock {
                segment_start: seg_idx,
                segment_end: seg_idx,
                items: Vec::new(),
            }),
        }
    }
    for block in &mut blocks {
        block.items = rows
            .iter()
            .filter(|(seg, _, _)| *seg >= block.segment_start && *seg <= block.segment_end)
            .map(|(_, delta, _)| delta.clone())
            .collect();
    }

    (blocks, changed_total, compared)
}
