#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Strategic lint exceptions - these are allowed project-wide for pragmatic reasons:
//
// Documentation lints: Many internal/self-documenting functions don't need extensive docs.
// Public APIs should still have proper documentation.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Cast safety: All casts in this codebase are bounded by real-world constraints
// (character offsets, version counters, token counts).
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
// Style/complexity: Diff and alignment passes naturally require long functions.
// Breaking them up would hurt readability.
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
//
// Pattern matching: These pedantic lints often suggest changes that reduce clarity.
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
//
// Performance/ergonomics trade-offs that are acceptable for this codebase:
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::unnecessary_wraps)]

//! # palimpsest-core
//!
//! Versioned transcript engine. An episode's text lives as a chain of
//! immutable [`types::Version`]s keyed by document path; every save appends
//! a child version plus the invertible [`diff::Op`] script that produced it,
//! and the whole chain can be replayed from v1 and checked against the
//! latest SHA-256.
//!
//! The crate is organised around the write path:
//!
//! - [`text`] normalizes editor text to the canonical byte form all hashing
//!   and diffing consume.
//! - [`diff`] produces deterministic, round-trip-invertible edit scripts and
//!   composes/merges positional edits.
//! - [`align`] re-derives per-word start/end times after an edit and guards
//!   against fake or non-monotonic timings.
//! - [`store`] owns persistence: an in-memory backend, an append-only
//!   checksummed journal backend, and the version store that enforces the
//!   conflict/CAS contract.
//! - [`engine`] coordinates saves, confirmations, and chain verification,
//!   and posts [`types::ChangeEvent`]s on the [`bus`].

/// The palimpsest-core crate version (matches `Cargo.toml`).
pub const PALIMPSEST_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod align;
pub mod bus;
pub mod constants;
pub mod diff;
pub mod engine;
pub mod error;
pub mod retry;
pub mod store;
pub mod text;
pub mod types;

pub use bus::EventBus;
pub use engine::{EngineConfig, TranscriptEngine};
pub use error::{EngineError, Result};
pub use store::{JournalStore, MemoryStore, RecordStore, VersionStore};
pub use types::{
    ChangeEvent, Confirmation, ConflictInfo, ConflictReason, EditRecord, LoadedDocument,
    SaveOutcome, SaveRequest, TimingAlert, TimingBlock, TimingDelta, VerifyOutcome, Version,
    VersionMeta, Word,
};
