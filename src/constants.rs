//! Shared tuning constants for the engine core.

use std::time::Duration;

/// Tolerance for monotonicity checks between adjacent word timings, seconds.
pub const TIMING_EPSILON: f64 = 1e-3;

/// Minimum duration assigned to a word token when filling or normalizing
/// timings inside an alignment window, seconds.
pub const MIN_WORD_DURATION: f64 = 0.02;

/// Minimum duration used when normalizing persisted segment timings where a
/// token has no usable end (matches the editor's playback floor), seconds.
pub const MIN_SEGMENT_TOKEN_DURATION: f64 = 0.20;

/// Context captured on each side of a confirmed range, in characters.
pub const CONFIRMATION_CONTEXT_CHARS: usize = 16;

/// Neighbor window clamp for segment alignment: `[0, MAX_ALIGN_NEIGHBORS]`.
pub const MAX_ALIGN_NEIGHBORS: u32 = 3;

/// How many previous-version tokens the carry-over pass scans ahead for an
/// exact payload match before giving up on a token.
pub const CARRY_OVER_LOOKAHEAD: usize = 128;

/// Soft wall-clock budget for a single diff computation. On exhaustion the
/// engine abandons the current strategy and cascades to a coarser one.
pub const DIFF_TIME_BUDGET: Duration = Duration::from_millis(800);

/// Default number of segments returned by a paged words read when the caller
/// gives a starting segment but no count.
pub const DEFAULT_SEGMENT_CHUNK: u32 = 50;

/// Retry policy bounds for transient store failures: attempts and the total
/// backoff ceiling across all of them.
pub const RETRY_MAX_ATTEMPTS: u32 = 6;
pub const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(25);
pub const RETRY_TOTAL_CEILING: Duration = Duration::from_millis(1_200);
