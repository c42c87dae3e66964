//! Carrying timings across versions and read-path duration repair.

use crate::constants::{CARRY_OVER_LOOKAHEAD, MIN_SEGMENT_TOKEN_DURATION};
use crate::types::Word;

struct PrevToken {
    key: String,
    start: Option<f64>,
    end: Option<f64>,
    probability: Option<f64>,
    used: bool,
}

/// Copy timings and probabilities from the previous version's tokens onto
/// incoming tokens whose payloads still match.
///
/// Matching is positional with a bounded lookahead: the scan cursor only
/// moves forward past consumed tokens, so a word repeated later in the
/// document does not steal an earlier occurrence's times. A full scan runs
/// once as a fallback when the window misses (large cut/paste moves).
#[must_use]
pub fn carry_over_timings(previous: &[Word], incoming: &[Word]) -> Vec<Word> {
    if previous.is_empty() || incoming.is_empty() {
        return incoming.to_vec();
    }

    let mut prev: Vec<PrevToken> = previous
        .iter()
        .filter(|token| token.is_lexical())
        .map(|token| PrevToken {
            key: token.word.trim().to_string(),
            start: token.start,
            end: token.end,
            probability: token.probability,
            used: false,
        })
        .collect();
    let mut cursor = 0usize;

    incoming
        .iter()
        .map(|token| {
            if !token.is_lexical() {
                return token.clone();
            }
            let timings_present = token.start.is_some_and(|s| s > 0.0)
                || token.end.is_some_and(|e| e > 0.0);
            let prob_present = token.probability.is_some();
            if timings_present && prob_present {
                return token.clone();
            }

            let mut enriched = token.clone();
            if let Some(idx) = find_match(&mut prev, &mut cursor, token.word.trim()) {
                let matched = &prev[idx];
                if !timings_present {
                    if matched.start.is_some() {
                        enriched.start = matched.start;
                    }
                    if matched.end.is_some() {
                        enriched.end = matched.end;
                    }
                }
                if !prob_present {
                    enriched.probability = matched.probability;
                }
            }
            enriched
        })
        .collect()
}

/// Next unused previous token with the given key: first within the
/// lookahead window past the cursor, then anywhere.
fn find_match(prev: &mut [PrevToken], cursor: &mut usize, key: &str) -> Option<usize> {
    let window_end = (*cursor + CARRY_OVER_LOOKAHEAD).min(prev.len());
    for idx in *cursor..window_end {
        if !prev[idx].used && prev[idx].key == key {
            prev[idx].used = true;
            *cursor = idx + 1;
            return Some(idx);
        }
    }
    for idx in 0..prev.len() {
        if !prev[idx].used && prev[idx].key == key {
            prev[idx].used = true;
            *cursor = idx + 1;
            return Some(idx);
        }
    }
    None
}

/// Repair token durations segment by segment for the read path: a token
/// whose end does not exceed its start borrows the next timed start in the
/// segment, or falls back to `start + min_dur`.
pub fn normalize_segment_durations(words: &mut [Word], min_dur: f64) {
    let min_dur = if min_dur > 0.0 {
        min_dur
    } else {
        MIN_SEGMENT_TOKEN_DURATION
    };

    let mut segment_start = 0usize;
    for idx in 0..=words.len() {
        let at_boundary = idx == words.len() || words[idx].is_newline();
        if !at_boundary {
            continue;
        }
        normalize_one_segment(&mut words[segment_start..idx], min_dur);
        segment_start = idx + 1;
    }
}

fn normalize_one_segment(segment: &mut [Word], min_dur: f64) {
    let starts: Vec<Option<f64>> = segment.iter().map(|w| w.start).collect();
    for i in 0..segment.len() {
        let token = &segment[i];
        if token.start.is_none() && token.end.is_none() {
            continue;
        }
        let start = token.start.unwrap_or(0.0);
        let end = token.end.unwrap_or(start);
        if end > start {
            continue;
        }
        let next_start = starts[i + 1..]
            .iter()
            .flatten()
            .copied()
            .find(|&s| s > start);
        segment[i].end = Some(next_start.unwrap_or(start + min_dur));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_times_onto_matching_payloads() {
        let previous = vec![
            Word::timed("hello", 0.0, 0.5),
            Word::plain(" "),
            Word::timed("world", 0.5, 1.0),
        ];
        let incoming = vec![
            Word::plain("hello"),
            Word::plain(" "),
            Word::plain("world"),
            Word::plain("!"),
        ];
        let enriched = carry_over_timings(&previous, &incoming);
        assert_eq!(enriched[0].start, Some(0.0));
        assert_eq!(enriched[2].end, Some(1.0));
        assert_eq!(enriched[3].start, None);
    }

    #[test]
    fn present_timings_are_not_overwritten() {
        let previous = vec![Word::timed("word", 0.0, 1.0)];
        let incoming = vec![Word {
            word: "word".into(),
            start: Some(5.0),
            end: Some(6.0),
            probability: Some(0.5),
        }];
        let enriched = carry_over_timings(&previous, &incoming);
        assert_eq!(enriched[0].start, Some(5.0));
        assert_eq!(enriched[0].probability, Some(0.5));
    }

    #[test]
    fn repeated_words_match_in_order() {
        let previous = vec![
            Word::timed("la", 0.0, 0.2),
            Word::timed("la", 0.3, 0.5),
            Word::timed("la", 0.6, 0.8),
        ];
        let incoming = vec![Word::plain("la"), Word::plain("la"), Word::plain("la")];
        let enriched = carry_over_timings(&previous, &incoming);
        assert_eq!(enriched[0].start, Some(0.0));
        assert_eq!(enriched[1].start, Some(0.3));
        assert_eq!(enriched[2].start, Some(0.6));
    }

    #[test]
    fn fallback_scan_finds_earlier_tokens() {
        let previous = vec![
            Word::timed("front", 0.0, 0.2),
            Word::timed("middle", 0.3, 0.5),
            Word::timed("back", 0.6, 0.8),
        ];
        // The paste moved "front" to the end; the cursor has advanced past
        // it by then, so the full scan must recover it.
        let incoming = vec![
            Word::plain("middle"),
            Word::plain("back"),
            Word::plain("front"),
        ];
        let enriched = carry_over_timings(&previous, &incoming);
        assert_eq!(enriched[2].start, Some(0.0));
    }

    #[test]
    fn probability_carries_independently() {
        let previous = vec![Word {
            word: "sure".into(),
            start: Some(1.0),
            end: Some(1.4),
            probability: Some(0.93),
        }];
        let incoming = vec![Word {
            word: "sure".into(),
            start: Some(2.0),
            end: Some(2.4),
            probability: None,
        }];
        let enriched = carry_over_timings(&previous, &incoming);
        // Timings present, probability missing: only the probability fills.
        assert_eq!(enriched[0].start, Some(2.0));
        assert_eq!(enriched[0].probability, Some(0.93));
    }

    #[test]
    fn normalize_borrows_next_start_within_segment() {
        let mut words = vec![
            Word::timed("a", 0.0, 0.0),
            Word::timed("b", 0.5, 0.9),
            Word::newline(),
            Word::timed("c", 1.0, 1.0),
        ];
        normalize_segment_durations(&mut words, 0.2);
        assert_eq!(words[0].end, Some(0.5));
        // Last token of its segment: no next start, falls back to min_dur.
        assert_eq!(words[3].end, Some(1.2));
    }

    #[test]
    fn normalize_skips_untimed_tokens() {
        let mut words = vec![Word::plain("x"), Word::plain("y")];
        normalize_segment_durations(&mut words, 0.2);
        assert_eq!(words[0].end, None);
        assert_eq!(words[1].end, None);
    }
}
