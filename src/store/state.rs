//! Shared in-memory document state used by both backends.

use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineError, Result};
use crate::types::{
    Confirmation, ConflictInfo, ConflictReason, EditRecord, TimingBlock, Version, VersionMeta, Word,
};

#[derive(Debug, Default)]
pub(crate) struct DocState {
    pub versions: BTreeMap<u32, Version>,
    /// Keyed by child version.
    pub edits: BTreeMap<u32, EditRecord>,
    pub confirmations: HashMap<u32, Vec<Confirmation>>,
}

/// All documents of one backend. Backends wrap this in their own lock.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    docs: HashMap<String, DocState>,
}

impl StoreState {
    pub fn latest(&self, doc: &str) -> Option<&Version> {
        self.docs
            .get(doc)
            .and_then(|d| d.versions.values().next_back())
    }

    pub fn get(&self, doc: &str, version: u32) -> Option<&Version> {
        self.docs.get(doc).and_then(|d| d.versions.get(&version))
    }

    pub fn history(&self, doc: &str) -> Vec<VersionMeta> {
        self.docs
            .get(doc)
            .map(|d| d.versions.values().map(Version::meta).collect())
            .unwrap_or_default()
    }

    pub fn edits(&self, doc: &str) -> Vec<EditRecord> {
        self.docs
            .get(doc)
            .map(|d| d.edits.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn confirmations(&self, doc: &str, version: u32) -> Vec<Confirmation> {
        let mut items = self
            .docs
            .get(doc)
            .and_then(|d| d.confirmations.get(&version))
            .cloned()
            .unwrap_or_default();
        items.sort_by_key(|c| (c.start_offset, c.end_offset));
        items
    }

    pub fn docs(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .docs
            .iter()
            .filter(|(_, d)| !d.versions.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// The CAS append: commits only while the latest version number still
    /// matches `expected_latest`.
    pub fn commit_version(
        &mut self,
        doc: &str,
        expected_latest: Option<u32>,
        version: Version,
        edit: Option<EditRecord>,
    ) -> Result<()> {
        let current = self.latest(doc).map(|v| v.version);
        if current != expected_latest {
            let latest_meta = self.latest(doc).map(Version::meta);
            return Err(EngineError::Conflict(Box::new(ConflictInfo {
                reason: ConflictReason::VersionConflict,
                latest: latest_meta,
                latest_text: self.latest(doc).map(|v| v.text.clone()),
                parent: None,
                parent_text: None,
                diff_parent_to_latest: Vec::new(),
                diff_parent_to_client: Vec::new(),
            })));
        }
        let child = current.unwrap_or(0) + 1;
        if version.version != child {
            return Err(EngineError::invalid_input(format!(
                "non-sequential version {} (expected {child})",
                version.version
            )));
        }
        if let Some(ref edit) = edit {
            if edit.child_version != child || edit.parent_version + 1 != child {
                return Err(EngineError::invalid_input(format!(
                    "edit record {}->{} does not fit child {child}",
                    edit.parent_version, edit.child_version
                )));
            }
        }

        let state = self.docs.entry(doc.to_string()).or_default();
        state.versions.insert(child, version);
        if let Some(edit) = edit {
            state.edits.insert(child, edit);
        }
        Ok(())
    }

    pub fn replace_words(
        &mut self,
        doc: &str,
        version: u32,
        words: Vec<Word>,
        blocks: Vec<TimingBlock>,
    ) -> Result<()> {
        let state = self
            .docs
            .get_mut(doc)
            .ok_or_else(|| EngineError::VersionNotFound {
                doc: doc.to_string(),
                version,
            })?;
        let stored = state
            .versions
            .get_mut(&version)
            .ok_or_else(|| EngineError::VersionNotFound {
                doc: doc.to_string(),
                version,
            })?;
        stored.words = words;

        if !blocks.is_empty() {
            if let Some(edit) = state.edits.get_mut(&version) {
                edit.timing_ops.get_or_insert_with(Vec::new).extend(blocks);
            }
        }
        Ok(())
    }

    pub fn replace_confirmations(
        &mut self,
        doc: &str,
        version: u32,
        items: Vec<Confirmation>,
    ) -> Result<()> {
        if self.get(doc, version).is_none() {
            return Err(EngineError::VersionNotFound {
                doc: doc.to_string(),
                version,
            });
        }
        if let Some(state) = self.docs.get_mut(doc) {
            state.confirmations.insert(version, items);
        }
        Ok(())
    }
}
