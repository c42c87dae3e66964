//! Canonical text form and hashing.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+").unwrap()
});

/// Invisible direction/format controls stripped from canonical text:
/// LRM, RLM, the embedding/override block, and the isolate block.
fn is_stripped_format_char(c: char) -> bool {
    matches!(c, '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

/// Normalize editor text to the stable byte form used for hashing, diffing,
/// and chain verification.
///
/// Carriage returns are dropped (so `\r\n` collapses to `\n`), NBSP becomes
/// an ASCII space, bidi/invisible format controls are stripped, trailing
/// spaces and tabs are trimmed from every line, and the result is Unicode
/// NFC. Idempotent: `canonicalize(canonicalize(s)) == canonicalize(s)`.
#[must_use]
pub fn canonicalize(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\r' => {}
            '\u{00A0}' => cleaned.push(' '),
            c if is_stripped_format_char(c) => {}
            c => cleaned.push(c),
        }
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut first = true;
    for line in cleaned.split('\n') {
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str(line.trim_end_matches([' ', '\t']));
    }

    out.nfc().collect()
}

/// Relaxed canonical form: every whitespace run (newlines included)
/// collapses to a single space and the ends are trimmed.
///
/// Used only to decide whether client-supplied tokens still agree with the
/// submitted text; never hashed or persisted.
#[must_use]
pub fn canon_relaxed(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\r' => {}
            '\u{00A0}' => cleaned.push(' '),
            c if is_stripped_format_char(c) => {}
            c => cleaned.push(c),
        }
    }
    WHITESPACE_RUN
        .replace_all(&cleaned, " ")
        .trim()
        .to_string()
}

/// SHA-256 of the UTF-8 bytes, as 64 lowercase hex characters.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
