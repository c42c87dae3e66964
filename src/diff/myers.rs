//! Myers O(ND) shortest edit script over generic token slices.
//!
//! Tie-breaks are fixed so the script is byte-identical across runs and
//! platforms: at a diagonal extreme, or when the path ending on the upper
//! diagonal is further along, the down move (insertion) is taken; otherwise
//! the right move (deletion).

use std::ops::Range;

use super::{DiffBudget, OpKind};

/// A coalesced run of one op kind, as index ranges into the two inputs.
///
/// `a` covers the consumed input tokens (empty for insertions), `b` the
/// produced output tokens (empty for deletions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SliceRun {
    pub kind: OpKind,
    pub a: Range<usize>,
    pub b: Range<usize>,
}

/// Shortest edit script between two token slices.
///
/// Returns `None` when the budget runs out mid-search; the caller cascades
/// to a coarser strategy.
pub(crate) fn diff_slices<T: PartialEq>(
    a: &[T],
    b: &[T],
    budget: &DiffBudget,
) -> Option<Vec<SliceRun>> {
    let n = a.len();
    let m = b.len();
    if n == 0 && m == 0 {
        return Some(Vec::new());
    }

    let max = n + m;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 1];
    let mut trace: Vec<Vec<isize>> = Vec::new();
    let mut found_d: Option<usize> = None;

    'outer: for d in 0..=max {
        if budget.exhausted() {
            return None;
        }
        trace.push(v.clone());
        let d_i = d as isize;
        let mut k = -d_i;
        while k <= d_i {
            let ki = (k + offset) as usize;
            let mut x = if k == -d_i || (k != d_i && v[ki - 1] < v[ki + 1]) {
                v[ki + 1]
            } else {
                v[ki - 1] + 1
            };
            let mut y = x - k;
            while (x as usize) < n && (y as usize) < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[ki] = x;
            if x as usize >= n && y as usize >= m {
                found_d = Some(d);
                break 'outer;
            }
            k += 2;
        }
    }

    // The search always terminates by d == n + m; a missing depth means the
    // loop was cut short, so treat it like budget exhaustion.
    let found_d = found_d?;

    // Walk the trace backwards, emitting steps in reverse.
    let mut steps: Vec<(OpKind, usize, usize)> = Vec::new();
    let mut x = n as isize;
    let mut y = m as isize;
    for d in (0..=found_d).rev() {
        if d == 0 {
            while x > 0 && y > 0 {
                steps.push((OpKind::Equal, (x - 1) as usize, (y - 1) as usize));
                x -= 1;
                y -= 1;
            }
            break;
        }

        let v = &trace[d];
        let d_i = d as isize;
        let k = x - y;
        let ki = (k + offset) as usize;
        let prev_k = if k == -d_i || (k != d_i && v[ki - 1] < v[ki + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_ki = (prev_k + offset) as usize;
        let prev_x = v[prev_ki];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            steps.push((OpKind::Equal, (x - 1) as usize, (y - 1) as usize));
            x -= 1;
            y -= 1;
        }
        if x == prev_x {
            steps.push((OpKind::Insert, x as usize, prev_y as usize));
        } else {
            steps.push((OpKind::Delete, prev_x as usize, y as usize));
        }
        x = prev_x;
        y = prev_y;
    }

    steps.reverse();
    Some(coalesce(steps))
}

fn coalesce(steps: Vec<(OpKind, usize, usize)>) -> Vec<SliceRun> {
    let mut runs: Vec<SliceRun> = Vec::with_capacity(steps.len());
    for (kind, a_idx, b_idx) in steps {
        if let Some(last) = runs.last_mut() {
            let extends = match kind {
                OpKind::Equal => {
                    last.kind == OpKind::Equal && last.a.end == a_idx && last.b.end == b_idx
                }
                OpKind::Delete => last.kind == OpKind::Delete && last.a.end == a_idx,
                OpKind::Insert => last.kind == OpKind::Insert && last.b.end == b_idx,
            };
            if extends {
                match kind {
                    OpKind::Equal => {
                        last.a.end += 1;
                        last.b.end += 1;
                    }
                    OpKind::Delete => last.a.end += 1,
                    OpKind::Insert => last.b.end += 1,
                }
                continue;
            }
        }
        let run = match kind {
            OpKind::Equal => SliceRun {
                kind,
                a: a_idx..a_idx + 1,
                b: b_idx..b_idx + 1,
            },
            OpKind::Delete => SliceRun {
                kind,
                a: a_idx..a_idx + 1,
                b: b_idx..b_idx,
            },
            OpKind::Insert => SliceRun {
                kind,
                a: a_idx..a_idx,
                b: b_idx..b_idx + 1,
            },
        };
        runs.push(run);
    }
    runs
}
