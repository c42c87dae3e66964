//! Diff refinement strategies: line anchoring, word-token and character
//! granularity.

use once_cell::sync::Lazy;
use regex::Regex;

use super::myers::diff_slices;
use super::{DiffBudget, Op, OpKind};

/// Word tokenizer used for middle-chunk refinement: a whitespace run, a
/// run of letters/marks/digits, or one other character. The three classes
/// partition the input, so the matches tile the string exactly.
static WORD_TOKENS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+|[\p{L}\p{M}\p{N}]+|[^\s\p{L}\p{M}\p{N}]").unwrap()
});

fn word_tokens(text: &str) -> Vec<&str> {
    WORD_TOKENS.find_iter(text).map(|m| m.as_str()).collect()
}

fn split_lines_keepends(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Line-anchored diff: strip common prefix and suffix lines, then refine
/// the changed middle.
///
/// A single replaced line on each side goes straight to word refinement;
/// otherwise the middle is diffed line-wise with Myers, and each deletion
/// chunk paired with a following insertion chunk is refined word-wise.
pub(super) fn line_anchor_diff(a: &str, b: &str, budget: &DiffBudget) -> Option<Vec<Op>> {
    let a_lines = split_lines_keepends(a);
    let b_lines = split_lines_keepends(b);

    let mut prefix = 0;
    while prefix < a_lines.len() && prefix < b_lines.len() && a_lines[prefix] == b_lines[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < a_lines.len() - prefix
        && suffix < b_lines.len() - prefix
        && a_lines[a_lines.len() - 1 - suffix] == b_lines[b_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mid_a = &a_lines[prefix..a_lines.len() - suffix];
    let mid_b = &b_lines[prefix..b_lines.len() - suffix];

    let mut ops: Vec<Op> = Vec::new();
    if prefix > 0 {
        ops.push(Op::equal(a_lines[..prefix].concat()));
    }

    if mid_a.is_empty() && mid_b.is_empty() {
        // Fully anchored; nothing changed in the middle.
    } else if mid_a.is_empty() {
        ops.push(Op::insert(mid_b.concat()));
    } else if mid_b.is_empty() {
        ops.push(Op::delete(mid_a.concat()));
    } else if mid_a.len() == 1 && mid_b.len() == 1 {
        ops.extend(word_chunk_diff(mid_a[0], mid_b[0], budget)?);
    } else {
        let runs = diff_slices(mid_a, mid_b, budget)?;
        let mut i = 0;
        while i < runs.len() {
            let run = &runs[i];
            match run.kind {
                OpKind::Equal => ops.push(Op::equal(mid_a[run.a.clone()].concat())),
                OpKind::Delete => {
                    if let Some(next) = runs.get(i + 1).filter(|r| r.kind == OpKind::Insert) {
                        let removed = mid_a[run.a.clone()].concat();
                        let added = mid_b[next.b.clone()].concat();
                        ops.extend(word_chunk_diff(&removed, &added, budget)?);
                        i += 1;
                    } else {
                        ops.push(Op::delete(mid_a[run.a.clone()].concat()));
                    }
                }
                OpKind::Insert => ops.push(Op::insert(mid_b[run.b.clone()].concat())),
            }
            i += 1;
        }
    }

    if suffix > 0 {
        ops.push(Op::equal(a_lines[a_lines.len() - suffix..].concat()));
    }
    Some(ops)
}

/// Word-granular diff over whole strings; the semantic fallback stage.
pub(super) fn word_diff(a: &str, b: &str, budget: &DiffBudget) -> Option<Vec<Op>> {
    word_chunk_diff(a, b, budget)
}

/// Word-token diff of one replaced chunk, falling back to character Myers
/// when the token script fails its round-trip.
fn word_chunk_diff(a: &str, b: &str, budget: &DiffBudget) -> Option<Vec<Op>> {
    let a_tokens = word_tokens(a);
    let b_tokens = word_tokens(b);
    let runs = diff_slices(&a_tokens, &b_tokens, budget)?;

    let mut ops: Vec<Op> = Vec::with_capacity(runs.len());
    for run in runs {
        let op = match run.kind {
            OpKind::Equal => Op::equal(a_tokens[run.a].concat()),
            OpKind::Delete => Op::delete(a_tokens[run.a].concat()),
            OpKind::Insert => Op::insert(b_tokens[run.b].concat()),
        };
        ops.push(op);
    }

    if super::round_trips(&super::normalize_ops(ops.clone()), a, b) {
        Some(ops)
    } else {
        char_chunk_diff(a, b, budget)
    }
}

/// Trimmed character Myers over the whole text: strip the common character
/// prefix/suffix, char-diff the middle.
pub(super) fn trimmed_char_diff(a: &str, b: &str, budget: &DiffBudget) -> Option<Vec<Op>> {
    let prefix = common_prefix_bytes(a, b);
    let (a_rest, b_rest) = (&a[prefix..], &b[prefix..]);
    let suffix = common_suffix_bytes(a_rest, b_rest);

    let mut ops: Vec<Op> = Vec::new();
    if prefix > 0 {
        ops.push(Op::equal(&a[..prefix]));
    }
    ops.extend(char_chunk_diff(
        &a_rest[..a_rest.len() - suffix],
        &b_rest[..b_rest.len() - suffix],
        budget,
    )?);
    if suffix > 0 {
        ops.push(Op::equal(&a_rest[a_rest.len() - suffix..]));
    }
    Some(ops)
}

fn char_chunk_diff(a: &str, b: &str, budget: &DiffBudget) -> Option<Vec<Op>> {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let runs = diff_slices(&a_chars, &b_chars, budget)?;

    let mut ops: Vec<Op> = Vec::with_capacity(runs.len());
    for run in runs {
        let op = match run.kind {
            OpKind::Equal => Op::equal(a_chars[run.a].iter().collect::<String>()),
            OpKind::Delete => Op::delete(a_chars[run.a].iter().collect::<String>()),
            OpKind::Insert => Op::insert(b_chars[run.b].iter().collect::<String>()),
        };
        ops.push(op);
    }
    Some(ops)
}

fn common_prefix_bytes(a: &str, b: &str) -> usize {
    let mut bytes = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        bytes += ca.len_utf8();
    }
    bytes
}

fn common_suffix_bytes(a: &str, b: &str) -> usize {
    let mut bytes = 0;
    for (ca, cb) in a.chars().rev().zip(b.chars().rev()) {
        if ca != cb {
            break;
        }
        bytes += ca.len_utf8();
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DIFF_TIME_BUDGET;
    use crate::diff::{normalize_ops, round_trips};

    fn budget() -> DiffBudget {
        DiffBudget::start(DIFF_TIME_BUDGET)
    }

    #[test]
    fn word_tokens_tile_the_input() {
        let text = "héllo,  wörld\n42nd";
        let tokens = word_tokens(text);
        assert_eq!(tokens.concat(), text);
        assert_eq!(
            tokens,
            vec!["héllo", ",", "  ", "wörld", "\n", "42nd"]
        );
    }

    #[test]
    fn line_anchor_keeps_context_lines_whole() {
        let a = "one\ntwo\nthree\n";
        let b = "one\nTWO two\nthree\n";
        let ops = normalize_ops(line_anchor_diff(a, b, &budget()).expect("ops"));
        assert!(round_trips(&ops, a, b));
        assert_eq!(ops[0], Op::equal("one\n"));
        assert_eq!(*ops.last().expect("last"), Op::equal("three\n"));
    }

    #[test]
    fn paired_delete_insert_refines_to_words() {
        let a = "aaa\nbbb ccc\nddd eee\nfff\n";
        let b = "aaa\nbbb xxx\nddd yyy\nfff\n";
        let ops = normalize_ops(line_anchor_diff(a, b, &budget()).expect("ops"));
        assert!(round_trips(&ops, a, b));
        // Unchanged words inside the replaced block stay as equal context.
        assert!(ops.iter().any(|op| op.kind == OpKind::Equal && op.text.contains("bbb")));
    }

    #[test]
    fn trimmed_char_diff_round_trips() {
        let a = "prefix MIDDLE suffix";
        let b = "prefix CENTRE suffix";
        let ops = normalize_ops(trimmed_char_diff(a, b, &budget()).expect("ops"));
        assert!(round_trips(&ops, a, b));
        assert_eq!(ops[0].kind, OpKind::Equal);
    }

    #[test]
    fn multibyte_boundaries_are_respected() {
        let a = "ααβ";
        let b = "ααγ";
        let ops = normalize_ops(trimmed_char_diff(a, b, &budget()).expect("ops"));
        assert!(round_trips(&ops, a, b));
    }
}
