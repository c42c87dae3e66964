//! Text canonicalization, hashing, and tokenization.
//!
//! Everything downstream of the editor (hashing, diffing, chain replay)
//! consumes the canonical byte form produced here; the tokenizer turns
//! canonical text back into the word-token shape the store persists.

pub mod canon;
pub mod tokenize;

pub use canon::{canon_relaxed, canonicalize, sha256_hex};
pub use tokenize::tokenize_to_words;
