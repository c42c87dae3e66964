//! Canonical text to word tokens.

use crate::types::Word;

/// Split text into the persisted token shape: alternating whitespace and
/// non-whitespace runs per line, with a bare `"\n"` token between lines.
///
/// Tokens carry no timings; the carry-over pass re-attaches them from the
/// previous version where payloads still match. Concatenating the returned
/// payloads reproduces the input exactly.
#[must_use]
pub fn tokenize_to_words(text: &str) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    let lines: Vec<&str> = text.split('\n').collect();
    let line_count = lines.len();

    for (line_idx, line) in lines.into_iter().enumerate() {
        let mut buffer = String::new();
        let mut buffer_is_space: Option<bool> = None;
        for c in line.chars() {
            let c_is_space = c.is_whitespace();
            match buffer_is_space {
                None => {
                    buffer.push(c);
                    buffer_is_space = Some(c_is_space);
                }
                Some(current) if current == c_is_space => buffer.push(c),
                Some(_) => {
                    words.push(Word::plain(std::mem::take(&mut buffer)));
                    buffer.push(c);
                    buffer_is_space = Some(c_is_space);
                }
            }
        }
        if !buffer.is_empty() {
            words.push(Word::plain(buffer));
        }
        if line_idx + 1 < line_count {
            words.push(Word::newline());
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::compose_text;

    #[test]
    fn splits_runs_and_newlines() {
        let words = tokenize_to_words("hello  world\nnext");
        let payloads: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(payloads, vec!["hello", "  ", "world", "\n", "next"]);
    }

    #[test]
    fn round_trips_exactly() {
        for text in [
            "",
            "one",
            "a b  c",
            "line1\nline2\n",
            "\n\n",
            "  leading\ttabs \n mixed ",
        ] {
            assert_eq!(compose_text(&tokenize_to_words(text)), text, "{text:?}");
        }
    }

    #[test]
    fn trailing_newline_yields_separator_token() {
        let words = tokenize_to_words("abc\n");
        assert_eq!(words.last().map(|w| w.word.as_str()), Some("\n"));
        assert_eq!(words.len(), 2);
    }
}
