//! The version store: conflict gate, gap-free numbering, and the edit
//! record chain, on top of any [`RecordStore`] backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use crate::align::{self, segment_token_range, validate_words};
use crate::constants::{DEFAULT_SEGMENT_CHUNK, MIN_SEGMENT_TOKEN_DURATION};
use crate::diff;
use crate::error::{EngineError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::text::{canonicalize, sha256_hex};
use crate::types::{
    compose_text, Confirmation, ConflictInfo, ConflictReason, EditRecord, TimingBlock, Version,
    VersionMeta, Word,
};

use super::RecordStore;

/// What a successful insert hands back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertReceipt {
    pub version: u32,
    pub base_sha256: String,
}

/// Serialises writes per document and enforces the insert contract:
/// canonical text, expected-parent conflict detection, gap-free child
/// numbering, and an edit record appended atomically with its version.
pub struct VersionStore {
    backend: Arc<dyn RecordStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    retry: RetryPolicy,
}

impl VersionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn RecordStore>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The per-document exclusive lock. Confirmation writes share it so a
    /// reader never observes a version with a half-replaced confirmation
    /// set.
    pub fn doc_lock(&self, doc: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| EngineError::Lock("doc lock table poisoned".into()))?;
        Ok(locks.entry(doc.to_string()).or_default().clone())
    }

    pub fn latest(&self, doc: &str) -> Result<Option<Version>> {
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend.latest(doc)
        })
    }

    pub fn get(&self, doc: &str, version: u32) -> Result<Option<Version>> {
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend.get(doc, version)
        })
    }

    pub fn history(&self, doc: &str) -> Result<Vec<VersionMeta>> {
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend.history(doc)
        })
    }

    pub fn edits(&self, doc: &str) -> Result<Vec<EditRecord>> {
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend.edits(doc)
        })
    }

    pub fn docs(&self) -> Result<Vec<String>> {
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend.docs()
        })
    }

    /// A version's words, optionally paged to the segment window
    /// `[segment, segment + count)`, with read-path duration repair.
    pub fn words(
        &self,
        doc: &str,
        version: u32,
        segment: Option<u32>,
        count: Option<u32>,
    ) -> Result<Vec<Word>> {
        let stored = self
            .get(doc, version)?
            .ok_or_else(|| EngineError::VersionNotFound {
                doc: doc.to_string(),
                version,
            })?;

        let mut words = match segment {
            Some(start_seg) => {
                let span = count.unwrap_or(DEFAULT_SEGMENT_CHUNK).max(1);
                let end_seg = start_seg + span - 1;
                let range = segment_token_range(&stored.words, start_seg, end_seg);
                stored.words[range].to_vec()
            }
            None => stored.words,
        };
        align::normalize_segment_durations(&mut words, MIN_SEGMENT_TOKEN_DURATION);
        Ok(words)
    }

    /// Append a child version.
    ///
    /// `parent_version`/`expected_base_sha256` are the client's baseline
    /// claim; a stale claim rejects with [`EngineError::Conflict`] carrying
    /// the latest and parent snapshots. The edit record for `parent ->
    /// child` is derived here and committed atomically with the version.
    pub fn insert(
        &self,
        doc: &str,
        parent_version: Option<u32>,
        expected_base_sha256: Option<&str>,
        text: &str,
        words: Vec<Word>,
        created_by: &str,
    ) -> Result<InsertReceipt> {
        let text = canonicalize(text);
        let base_sha256 = sha256_hex(&text);

        if !words.is_empty() && compose_text(&words) != text {
            return Err(EngineError::invalid_input(
                "word payloads do not concatenate to the canonical text",
            ));
        }
        validate_words(&words)?;

        let lock = self.doc_lock(doc)?;
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Lock(format!("doc lock poisoned for {doc}")))?;

        let latest = self.latest(doc)?;
        self.check_conflict(doc, latest.as_ref(), parent_version, expected_base_sha256, &text)?;

        let child = latest.as_ref().map_or(0, |v| v.version) + 1;
        let edit = latest.as_ref().map(|parent| EditRecord {
            parent_version: parent.version,
            child_version: child,
            text_ops: diff::diff_canonical(&parent.text, &text),
            timing_ops: None,
        });

        let version = Version {
            version: child,
            base_sha256: base_sha256.clone(),
            text,
            words,
            created_by: created_by.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };

        let expected_latest = latest.as_ref().map(|v| v.version);
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend
                .commit_version(doc, expected_latest, version.clone(), edit.clone())
        })?;

        tracing::info!(
            save.doc = doc,
            save.version = child,
            save.hash = %base_sha256,
            "version committed"
        );
        Ok(InsertReceipt {
            version: child,
            base_sha256,
        })
    }

    /// Replace a version's words after alignment and persist the timing
    /// blocks onto its edit record.
    pub fn apply_alignment(
        &self,
        doc: &str,
        version: u32,
        words: Vec<Word>,
        blocks: Vec<TimingBlock>,
    ) -> Result<()> {
        validate_words(&words)?;
        let lock = self.doc_lock(doc)?;
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Lock(format!("doc lock poisoned for {doc}")))?;
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend
                .replace_words(doc, version, words.clone(), blocks.clone())
        })
    }

    pub fn confirmations(&self, doc: &str, version: u32) -> Result<Vec<Confirmation>> {
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend.confirmations(doc, version)
        })
    }

    /// Replace the confirmation set for `(doc, version)` under the same
    /// lock version writes take.
    pub fn replace_confirmations(
        &self,
        doc: &str,
        version: u32,
        items: Vec<Confirmation>,
    ) -> Result<()> {
        let lock = self.doc_lock(doc)?;
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Lock(format!("doc lock poisoned for {doc}")))?;
        with_retry(&self.retry, EngineError::is_transient, || {
            self.backend
                .replace_confirmations(doc, version, items.clone())
        })
    }

    fn check_conflict(
        &self,
        doc: &str,
        latest: Option<&Version>,
        parent_version: Option<u32>,
        expected_base_sha256: Option<&str>,
        client_text: &str,
    ) -> Result<()> {
        let Some(latest) = latest else {
            // First save: the client must not claim a parent.
            return match parent_version {
                None | Some(0) => Ok(()),
                Some(_) => Err(self.conflict(
                    doc,
                    ConflictReason::InvalidParentForFirst,
                    None,
                    parent_version,
                    client_text,
                )),
            };
        };

        let Some(parent) = parent_version.filter(|&p| p > 0) else {
            return Err(self.conflict(
                doc,
                ConflictReason::MissingParent,
                Some(latest),
                None,
                client_text,
            ));
        };

        let expected = expected_base_sha256.unwrap_or("");
        if expected.is_empty() {
            return Err(self.conflict(
                doc,
                ConflictReason::HashMissing,
                Some(latest),
                Some(parent),
                client_text,
            ));
        }
        if parent != latest.version {
            return Err(self.conflict(
                doc,
                ConflictReason::VersionConflict,
                Some(latest),
                Some(parent),
                client_text,
            ));
        }
        if expected != sha256_hex(&canonicalize(&latest.text)) {
            return Err(self.conflict(
                doc,
                ConflictReason::HashConflict,
                Some(latest),
                Some(parent),
                client_text,
            ));
        }
        Ok(())
    }

    fn conflict(
        &self,
        doc: &str,
        reason: ConflictReason,
        latest: Option<&Version>,
        parent_version: Option<u32>,
        client_text: &str,
    ) -> EngineError {
        EngineError::Conflict(self.build_conflict(doc, reason, latest, parent_version, client_text))
    }

    /// Conflict payload with parent/latest snapshots and both diff streams.
    pub(crate) fn build_conflict(
        &self,
        doc: &str,
        reason: ConflictReason,
        latest: Option<&Version>,
        parent_version: Option<u32>,
        client_text: &str,
    ) -> Box<ConflictInfo> {
        let parent = parent_version
            .filter(|&p| p > 0)
            .and_then(|p| self.get(doc, p).ok().flatten());

        let diff_parent_to_latest = match (&parent, latest) {
            (Some(p), Some(l)) => diff::diff_canonical(&p.text, &l.text),
            _ => Vec::new(),
        };
        let diff_parent_to_client = parent
            .as_ref()
            .map(|p| diff::diff_canonical(&p.text, client_text))
            .unwrap_or_default();

        Box::new(ConflictInfo {
            reason,
            latest: latest.map(Version::meta),
            latest_text: latest.map(|v| v.text.clone()),
            parent: parent.as_ref().map(Version::meta),
            parent_text: parent.map(|p| p.text),
            diff_parent_to_latest,
            diff_parent_to_client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::text::tokenize_to_words;

    fn store() -> VersionStore {
        VersionStore::new(Arc::new(MemoryStore::new()))
    }

    fn insert_plain(
        store: &VersionStore,
        doc: &str,
        parent: Option<(u32, &str)>,
        text: &str,
    ) -> Result<InsertReceipt> {
        store.insert(
            doc,
            parent.map(|(v, _)| v),
            parent.map(|(_, h)| h),
            text,
            tokenize_to_words(&canonicalize(text)),
            "tester",
        )
    }

    #[test]
    fn first_insert_creates_version_one() {
        let store = store();
        let receipt = insert_plain(&store, "doc", None, "hello world").expect("insert");
        assert_eq!(receipt.version, 1);
        assert_eq!(receipt.base_sha256, sha256_hex("hello world"));
        let history = store.history("doc").expect("history");
        assert_eq!(history.len(), 1);
        assert!(store.edits("doc").expect("edits").is_empty());
    }

    #[test]
    fn second_insert_chains_an_edit_record() {
        let store = store();
        let first = insert_plain(&store, "doc", None, "hello world").expect("v1");
        let second = insert_plain(
            &store,
            "doc",
            Some((1, first.base_sha256.as_str())),
            "hello world!",
        )
        .expect("v2");
        assert_eq!(second.version, 2);

        let edits = store.edits("doc").expect("edits");
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].parent_version, 1);
        assert_eq!(edits[0].child_version, 2);
        assert_eq!(diff::reconstruct_old(&edits[0].text_ops), "hello world");
        assert_eq!(diff::reconstruct_new(&edits[0].text_ops), "hello world!");
    }

    #[test]
    fn stale_parent_is_a_version_conflict() {
        let store = store();
        let first = insert_plain(&store, "doc", None, "base").expect("v1");
        insert_plain(&store, "doc", Some((1, first.base_sha256.as_str())), "base two")
            .expect("v2");

        let err = insert_plain(&store, "doc", Some((1, first.base_sha256.as_str())), "base mine")
            .expect_err("stale parent");
        match err {
            EngineError::Conflict(info) => {
                assert_eq!(info.reason, ConflictReason::VersionConflict);
                assert_eq!(info.latest.as_ref().map(|m| m.version), Some(2));
                assert_eq!(info.parent.as_ref().map(|m| m.version), Some(1));
                assert!(!info.diff_parent_to_latest.is_empty());
                assert!(!info.diff_parent_to_client.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_hash_is_a_hash_conflict() {
        let store = store();
        insert_plain(&store, "doc", None, "base").expect("v1");
        let err = insert_plain(&store, "doc", Some((1, "deadbeef")), "mine")
            .expect_err("bad hash");
        match err {
            EngineError::Conflict(info) => {
                assert_eq!(info.reason, ConflictReason::HashConflict);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_parent_and_missing_hash_are_rejected() {
        let store = store();
        let first = insert_plain(&store, "doc", None, "base").expect("v1");

        let err = insert_plain(&store, "doc", None, "no parent").expect_err("missing parent");
        assert!(matches!(
            err,
            EngineError::Conflict(ref info) if info.reason == ConflictReason::MissingParent
        ));

        let err = store
            .insert("doc", Some(1), None, "no hash", Vec::new(), "tester")
            .expect_err("missing hash");
        assert!(matches!(
            err,
            EngineError::Conflict(ref info) if info.reason == ConflictReason::HashMissing
        ));
        drop(first);
    }

    #[test]
    fn parent_on_first_save_is_rejected() {
        let store = store();
        let err = insert_plain(&store, "doc", Some((3, "feed")), "text")
            .expect_err("invalid parent");
        assert!(matches!(
            err,
            EngineError::Conflict(ref info) if info.reason == ConflictReason::InvalidParentForFirst
        ));
    }

    #[test]
    fn mismatched_words_are_rejected() {
        let store = store();
        let err = store
            .insert(
                "doc",
                None,
                None,
                "actual text",
                vec![Word::plain("other")],
                "tester",
            )
            .expect_err("payload mismatch");
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn fake_timings_never_reach_the_backend() {
        let store = store();
        let words = vec![Word {
            word: "x".into(),
            start: Some(9_999_999_990.1),
            end: Some(9_999_999_990.2),
            probability: None,
        }];
        let err = store
            .insert("doc", None, None, "x", words, "tester")
            .expect_err("fake timing");
        assert!(matches!(err, EngineError::FakeTiming { .. }));
        assert!(store.latest("doc").expect("latest").is_none());
    }

    #[test]
    fn words_pages_by_segment_window() {
        let store = store();
        insert_plain(&store, "doc", None, "seg zero\nseg one\nseg two").expect("v1");
        let page = store.words("doc", 1, Some(1), Some(1)).expect("page");
        assert_eq!(compose_text(&page), "seg one");
        let all = store.words("doc", 1, None, None).expect("all");
        assert_eq!(compose_text(&all), "seg zero\nseg one\nseg two");
    }

    #[test]
    fn concurrent_inserts_agree_on_one_winner() {
        use std::thread;

        let store = Arc::new(store());
        let first = insert_plain(store.as_ref(), "doc", None, "base").expect("v1");

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = Arc::clone(&store);
            let hash = first.base_sha256.clone();
            handles.push(thread::spawn(move || {
                store.insert(
                    "doc",
                    Some(1),
                    Some(hash.as_str()),
                    &format!("base edit {i}"),
                    Vec::new(),
                    "racer",
                )
            }));
        }

        let results: Vec<Result<InsertReceipt>> =
            handles.into_iter().map(|h| h.join().expect("join")).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one racer commits");
        for result in results {
            if let Err(EngineError::Conflict(info)) = result {
                assert_eq!(info.latest.as_ref().map(|m| m.version), Some(2));
            }
        }
        assert_eq!(
            store.latest("doc").expect("latest").map(|v| v.version),
            Some(2)
        );
    }
}
