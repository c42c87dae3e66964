//! The engine facade: one owner for the store, the bus, the save
//! coordinator, and the confirmation manager.
//!
//! The editor talks only to [`TranscriptEngine`]; the engine talks to the
//! store and posts [`ChangeEvent`]s back on the bus the editor subscribes
//! to.

pub mod confirm;
mod save;
pub mod verify;

use std::collections::HashSet;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use crate::bus::EventBus;
use crate::diff::{auto_merge, MergeOutcome};
use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;
use crate::store::{RecordStore, VersionStore};
use crate::types::{
    ChangeEvent, Confirmation, EditRecord, LoadedDocument, SaveOutcome, SaveRequest, VerifyOutcome,
    VersionMeta, Word,
};

pub use save::DocPhase;

/// Engine-wide knobs. Everything else is a fixed constant of the format.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry schedule for transient store failures.
    pub retry: RetryPolicy,
    /// Default alignment neighbour radius when a request does not set one.
    pub default_neighbors: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            default_neighbors: 1,
        }
    }
}

/// The versioned transcript engine.
pub struct TranscriptEngine {
    store: Arc<VersionStore>,
    bus: Arc<EventBus>,
    coordinator: save::SaveCoordinator,
    /// Advisory "document has corrections" cache, repopulated from the
    /// store on startup; a miss is always resolved against the store.
    corrections: Mutex<HashSet<String>>,
    config: EngineConfig,
}

impl TranscriptEngine {
    /// Engine over the given backend with default configuration.
    pub fn new(backend: Arc<dyn RecordStore>) -> Result<Self> {
        Self::with_config(backend, EngineConfig::default())
    }

    pub fn with_config(backend: Arc<dyn RecordStore>, config: EngineConfig) -> Result<Self> {
        let store = Arc::new(VersionStore::new(backend).with_retry_policy(config.retry));
        let bus = Arc::new(EventBus::new());
        let coordinator = save::SaveCoordinator::new(Arc::clone(&store), Arc::clone(&bus))?;

        let corrections: HashSet<String> = store.docs()?.into_iter().collect();
        tracing::debug!(
            engine.docs = corrections.len(),
            "corrections cache repopulated"
        );

        Ok(Self {
            store,
            bus,
            coordinator,
            corrections: Mutex::new(corrections),
            config,
        })
    }

    /// Subscribe to engine change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    /// Everything the editor needs to open a document.
    pub fn load(&self, doc: &str) -> Result<LoadedDocument> {
        let latest = self
            .store
            .latest(doc)?
            .ok_or_else(|| EngineError::VersionNotFound {
                doc: doc.to_string(),
                version: 0,
            })?;
        let words = self.store.words(doc, latest.version, None, None)?;
        let confirmations = self.store.confirmations(doc, latest.version)?;
        Ok(LoadedDocument {
            doc: doc.to_string(),
            version: latest.version,
            base_sha256: latest.base_sha256,
            text: latest.text,
            words,
            confirmations,
        })
    }

    /// Save a new version. See [`SaveOutcome`] for the three-way result.
    pub fn save(&self, mut request: SaveRequest) -> Result<SaveOutcome> {
        if request.doc.trim().is_empty() {
            return Err(EngineError::invalid_input("missing document path"));
        }
        if request.neighbors == 0 && request.caret_segment.is_some() {
            request.neighbors = self.config.default_neighbors;
        }

        let outcome = self.coordinator.save(&request)?;
        if matches!(outcome, SaveOutcome::Saved(_)) {
            if let Ok(mut cache) = self.corrections.lock() {
                cache.insert(request.doc.clone());
            }
        }
        Ok(outcome)
    }

    /// Compose the two edit streams of a conflict into a merged text, ready
    /// to be re-saved on top of `latest`.
    pub fn merge_conflict(
        &self,
        conflict: &crate::types::ConflictInfo,
        client_text: &str,
    ) -> Result<MergeOutcome> {
        let (Some(parent_text), Some(latest_text)) =
            (conflict.parent_text.as_deref(), conflict.latest_text.as_deref())
        else {
            return Err(EngineError::invalid_input(
                "conflict payload carries no parent/latest text to merge",
            ));
        };
        Ok(auto_merge(parent_text, latest_text, client_text))
    }

    /// Observable save/align phase for a document.
    #[must_use]
    pub fn phase(&self, doc: &str) -> DocPhase {
        self.coordinator.phase(doc)
    }

    /// Block until queued background alignment work has drained.
    pub fn flush_alignment(&self) {
        self.coordinator.flush_alignment();
    }

    /// Whether the document has any saved corrections (advisory; resolves
    /// misses against the store).
    pub fn has_corrections(&self, doc: &str) -> bool {
        if let Ok(cache) = self.corrections.lock() {
            if cache.contains(doc) {
                return true;
            }
        }
        match self.store.latest(doc) {
            Ok(Some(_)) => {
                if let Ok(mut cache) = self.corrections.lock() {
                    cache.insert(doc.to_string());
                }
                true
            }
            _ => false,
        }
    }

    /// A version's words, optionally paged by segment window.
    pub fn words(
        &self,
        doc: &str,
        version: u32,
        segment: Option<u32>,
        count: Option<u32>,
    ) -> Result<Vec<Word>> {
        self.store.words(doc, version, segment, count)
    }

    /// Version lineage, ascending.
    pub fn history(&self, doc: &str) -> Result<Vec<VersionMeta>> {
        self.store.history(doc)
    }

    /// Edit records, ascending by child version.
    pub fn edits(&self, doc: &str) -> Result<Vec<EditRecord>> {
        self.store.edits(doc)
    }

    /// Replay the edit chain and check the final hash.
    pub fn verify(&self, doc: &str) -> Result<VerifyOutcome> {
        verify::verify(&self.store, doc)
    }

    /// Replace the confirmation set for a version; the client must prove
    /// its text matches the stored hash.
    pub fn save_confirmations(
        &self,
        doc: &str,
        version: u32,
        base_sha256: &str,
        ranges: &[(u32, u32)],
        full_text: &str,
    ) -> Result<usize> {
        let count =
            confirm::save_confirmations(&self.store, doc, version, base_sha256, ranges, full_text)?;
        self.bus.publish(&ChangeEvent::ConfirmationsChanged {
            doc: doc.to_string(),
            version,
            count,
        });
        Ok(count)
    }

    /// The anchored confirmation list for a version.
    pub fn confirmations(&self, doc: &str, version: u32) -> Result<Vec<Confirmation>> {
        self.store.confirmations(doc, version)
    }
}
