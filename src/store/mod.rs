//! Persistence: the record-store seam, its two backends, and the version
//! store that enforces the conflict/CAS contract on top of them.

mod journal;
mod memory;
mod state;
mod versions;

use crate::error::Result;
use crate::types::{Confirmation, EditRecord, TimingBlock, Version, VersionMeta, Word};

pub use journal::JournalStore;
pub use memory::MemoryStore;
pub use versions::{InsertReceipt, VersionStore};

/// The backing store seam.
///
/// Implementations provide per-document ordered scans, an atomic
/// compare-and-swap append of a version (plus its edit record), and
/// replace-style writes for word sequences and confirmation sets. All
/// methods are safe to call from multiple threads.
pub trait RecordStore: Send + Sync {
    /// Highest-numbered version of the document, if any.
    fn latest(&self, doc: &str) -> Result<Option<Version>>;

    /// A specific version.
    fn get(&self, doc: &str, version: u32) -> Result<Option<Version>>;

    /// Version metadata in ascending version order.
    fn history(&self, doc: &str) -> Result<Vec<VersionMeta>>;

    /// Edit records in ascending child-version order.
    fn edits(&self, doc: &str) -> Result<Vec<EditRecord>>;

    /// Append `version` (and its edit record) atomically.
    ///
    /// `expected_latest` is the compare-and-swap guard: the append commits
    /// only while the store's latest version number still matches it
    /// (`None` meaning "no versions yet"). On a stale guard the append
    /// fails with a conflict carrying the current latest metadata.
    fn commit_version(
        &self,
        doc: &str,
        expected_latest: Option<u32>,
        version: Version,
        edit: Option<EditRecord>,
    ) -> Result<()>;

    /// Replace a version's word sequence and append alignment timing
    /// blocks to its edit record.
    fn replace_words(
        &self,
        doc: &str,
        version: u32,
        words: Vec<Word>,
        blocks: Vec<TimingBlock>,
    ) -> Result<()>;

    /// Confirmations for a version, ordered by start offset.
    fn confirmations(&self, doc: &str, version: u32) -> Result<Vec<Confirmation>>;

    /// Replace the whole confirmation set for a version.
    fn replace_confirmations(
        &self,
        doc: &str,
        version: u32,
        items: Vec<Confirmation>,
    ) -> Result<()>;

    /// Every document path with at least one version.
    fn docs(&self) -> Result<Vec<String>>;
}
