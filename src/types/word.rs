//! The time-aligned word token model.

use serde::{Deserialize, Serialize};

/// One token of a version's word sequence.
///
/// A token is either a lexical word, a whitespace run, or the literal
/// `"\n"` acting as a segment separator. Concatenating every token's
/// `word` payload reproduces the version's canonical text exactly.
///
/// Timings are seconds into the episode audio. `start`/`end` are `None`
/// when the token has never been aligned (typed text, whitespace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl Word {
    /// A bare token with no timing information.
    #[must_use]
    pub fn plain(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            start: None,
            end: None,
            probability: None,
        }
    }

    /// The `"\n"` segment separator token.
    #[must_use]
    pub fn newline() -> Self {
        Self::plain("\n")
    }

    /// A timed token.
    #[must_use]
    pub fn timed(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start: Some(start),
            end: Some(end),
            probability: None,
        }
    }

    #[must_use]
    pub fn is_newline(&self) -> bool {
        self.word == "\n"
    }

    /// Whitespace run that is not the newline separator.
    #[must_use]
    pub fn is_space_run(&self) -> bool {
        !self.is_newline() && !self.word.is_empty() && self.word.chars().all(char::is_whitespace)
    }

    /// Lexical token: non-empty, not a separator, not pure whitespace.
    #[must_use]
    pub fn is_lexical(&self) -> bool {
        !self.word.is_empty() && !self.is_newline() && !self.is_space_run()
    }

    #[must_use]
    pub fn has_timing(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Concatenate token payloads back into the version text.
#[must_use]
pub fn compose_text(words: &[Word]) -> String {
    let mut out = String::with_capacity(words.iter().map(|w| w.word.len()).sum());
    for token in words {
        out.push_str(&token.word);
    }
    out
}

/// Number of segments the token sequence spans (newline separators plus the
/// trailing run, if any).
#[must_use]
pub fn segment_count(words: &[Word]) -> u32 {
    let newlines = words.iter().filter(|w| w.is_newline()).count() as u32;
    let has_tail = words
        .iter()
        .rev()
        .take_while(|w| !w.is_newline())
        .any(|w| !w.word.is_empty());
    newlines + u32::from(has_tail)
}

/// Scrub client-supplied tokens into the persisted shape.
///
/// Non-finite and negative timings become `None`/zero; an `end` earlier than
/// its `start` is dropped rather than silently reordered.
#[must_use]
pub fn sanitize_words(words: &[Word]) -> Vec<Word> {
    fn scrub(value: Option<f64>) -> Option<f64> {
        let number = value?;
        if !number.is_finite() {
            return None;
        }
        Some(number.max(0.0))
    }

    words
        .iter()
        .map(|token| {
            let start = scrub(token.start);
            let mut end = scrub(token.end);
            if let (Some(s), Some(e)) = (start, end) {
                if e < s {
                    end = None;
                }
            }
            let probability = scrub(token.probability).map(|p| p.clamp(0.0, 1.0));
            Word {
                word: token.word.clone(),
                start,
                end,
                probability,
            }
        })
        .collect()
}
