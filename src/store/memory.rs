//! In-memory backend: the default store for tests and embedding hosts that
//! bring their own durability.

use std::sync::Mutex;

use super::state::StoreState;
use super::RecordStore;
use crate::error::{EngineError, Result};
use crate::types::{Confirmation, EditRecord, TimingBlock, Version, VersionMeta, Word};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| EngineError::Lock("memory store poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

impl RecordStore for MemoryStore {
    fn latest(&self, doc: &str) -> Result<Option<Version>> {
        self.locked(|state| state.latest(doc).cloned())
    }

    fn get(&self, doc: &str, version: u32) -> Result<Option<Version>> {
        self.locked(|state| state.get(doc, version).cloned())
    }

    fn history(&self, doc: &str) -> Result<Vec<VersionMeta>> {
        self.locked(|state| state.history(doc))
    }

    fn edits(&self, doc: &str) -> Result<Vec<EditRecord>> {
        self.locked(|state| state.edits(doc))
    }

    fn commit_version(
        &self,
        doc: &str,
        expected_latest: Option<u32>,
        version: Version,
        edit: Option<EditRecord>,
    ) -> Result<()> {
        self.locked(|state| state.commit_version(doc, expected_latest, version, edit))?
    }

    fn replace_words(
        &self,
        doc: &str,
        version: u32,
        words: Vec<Word>,
        blocks: Vec<TimingBlock>,
    ) -> Result<()> {
        self.locked(|state| state.replace_words(doc, version, words, blocks))?
    }

    fn confirmations(&self, doc: &str, version: u32) -> Result<Vec<Confirmation>> {
        self.locked(|state| state.confirmations(doc, version))
    }

    fn replace_confirmations(
        &self,
        doc: &str,
        version: u32,
        items: Vec<Confirmation>,
    ) -> Result<()> {
        self.locked(|state| state.replace_confirmations(doc, version, items))?
    }

    fn docs(&self) -> Result<Vec<String>> {
        self.locked(|state| state.docs())
    }
}
