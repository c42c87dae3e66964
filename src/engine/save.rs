//! The save coordinator: conflict gating, words-for-save assembly, the
//! background alignment task, and post-commit chain verification.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::verify;
use crate::align;
use crate::bus::EventBus;
use crate::error::{EngineError, Result};
use crate::store::VersionStore;
use crate::text::{canon_relaxed, canonicalize, sha256_hex, tokenize_to_words};
use crate::types::{
    compose_text, sanitize_words, AlignStatus, ChangeEvent, SaveOutcome, SaveRequest, SavedVersion,
    TimingAlert, Word,
};

/// Observable per-document phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocPhase {
    #[default]
    Idle,
    Saving,
    Aligning,
}

enum AlignTask {
    Align {
        doc: String,
        version: u32,
        baseline: Vec<Word>,
        current: Vec<Word>,
        segment: u32,
        neighbors: u32,
    },
    /// Test/shutdown barrier: acks once every earlier task has drained.
    Flush(SyncSender<()>),
}

pub(crate) struct SaveCoordinator {
    store: Arc<VersionStore>,
    bus: Arc<EventBus>,
    phases: Arc<Mutex<HashMap<String, DocPhase>>>,
    align_tx: Sender<AlignTask>,
    worker: Option<JoinHandle<()>>,
}

impl SaveCoordinator {
    pub fn new(store: Arc<VersionStore>, bus: Arc<EventBus>) -> Result<Self> {
        let phases: Arc<Mutex<HashMap<String, DocPhase>>> = Arc::default();
        let (align_tx, align_rx) = channel();
        let worker = spawn_align_worker(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&phases),
            align_rx,
        )?;
        Ok(Self {
            store,
            bus,
            phases,
            align_tx,
            worker: Some(worker),
        })
    }

    pub fn phase(&self, doc: &str) -> DocPhase {
        self.phases
            .lock()
            .ok()
            .and_then(|phases| phases.get(doc).copied())
            .unwrap_or_default()
    }

    fn set_phase(&self, doc: &str, phase: DocPhase) {
        if let Ok(mut phases) = self.phases.lock() {
            phases.insert(doc.to_string(), phase);
        }
    }

    /// Block until every queued alignment task has run.
    pub fn flush_alignment(&self) {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        if self.align_tx.send(AlignTask::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    /// The full save pipeline.
    pub fn save(&self, request: &SaveRequest) -> Result<SaveOutcome> {
        let text = canonicalize(&request.text);
        let new_hash = sha256_hex(&text);

        // No-op short-circuit: the client's baseline already hashes to the
        // submitted text.
        if request.parent_version.unwrap_or(0) > 0
            && request.expected_base_sha256.as_deref() == Some(new_hash.as_str())
        {
            tracing::debug!(save.doc = %request.doc, "no-change save short-circuited");
            return Ok(SaveOutcome::NoChange);
        }

        // Early conflict probe before any heavier work; the store re-checks
        // under its lock, this just gets the merge dialog its diffs sooner.
        let latest = self.store.latest(&request.doc)?;
        if let Some(ref latest_version) = latest {
            if request.parent_version.unwrap_or(0) > 0
                && request.parent_version != Some(latest_version.version)
            {
                let info = self.store.build_conflict(
                    &request.doc,
                    crate::types::ConflictReason::VersionConflict,
                    Some(latest_version),
                    request.parent_version,
                    &text,
                );
                return Ok(SaveOutcome::Conflict(info));
            }
        }

        self.set_phase(&request.doc, DocPhase::Saving);
        let result = self.save_locked(request, &text, latest);
        if !matches!(result, Ok(SaveOutcome::Saved(_))) {
            self.set_phase(&request.doc, DocPhase::Idle);
        }
        result
    }

    fn save_locked(
        &self,
        request: &SaveRequest,
        text: &str,
        latest: Option<crate::types::Version>,
    ) -> Result<SaveOutcome> {
        let (words, timing_alert) = build_words_for_save(request, text, latest.as_ref());

        let receipt = match self.store.insert(
            &request.doc,
            request.parent_version,
            request.expected_base_sha256.as_deref(),
            text,
            words,
            &request.created_by,
        ) {
            Ok(receipt) => receipt,
            Err(EngineError::Conflict(info)) => return Ok(SaveOutcome::Conflict(info)),
            Err(other) => return Err(other),
        };

        self.bus.publish(&ChangeEvent::VersionChanged {
            doc: request.doc.clone(),
            version: receipt.version,
            base_sha256: receipt.base_sha256.clone(),
        });

        // Background alignment around the caret; the save does not wait.
        let queued = self.queue_alignment(request, &latest, receipt.version);
        self.set_phase(
            &request.doc,
            if queued { DocPhase::Aligning } else { DocPhase::Idle },
        );

        let verify = verify::verify(&self.store, &request.doc)?;
        if !verify.is_ok() {
            tracing::warn!(
                save.doc = %request.doc,
                save.version = receipt.version,
                verify = ?verify,
                "chain verification failed after save"
            );
        }

        Ok(SaveOutcome::Saved(SavedVersion {
            version: receipt.version,
            base_sha256: receipt.base_sha256,
            verify,
            timing_alert,
        }))
    }

    fn queue_alignment(
        &self,
        request: &SaveRequest,
        latest: &Option<crate::types::Version>,
        new_version: u32,
    ) -> bool {
        let (Some(segment), Some(parent)) = (request.caret_segment, latest.as_ref()) else {
            return false;
        };
        let Ok(Some(stored)) = self.store.get(&request.doc, new_version) else {
            return false;
        };
        let task = AlignTask::Align {
            doc: request.doc.clone(),
            version: new_version,
            baseline: parent.words.clone(),
            current: stored.words,
            segment,
            neighbors: request.neighbors,
        };
        self.align_tx.send(task).is_ok()
    }
}

impl Drop for SaveCoordinator {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        let (tx, _rx) = channel();
        drop(std::mem::replace(&mut self.align_tx, tx));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Assemble the word sequence to persist with a save.
///
/// Client tokens are kept when they still concatenate to the canonical
/// text; otherwise the text is re-tokenized and the client tokens donate
/// their timings. Fake sentinel timings are stripped (the text still
/// commits), prior-version timings are carried over onto matching payloads,
/// and a final monotonise pass repairs regressions introduced by moved
/// text.
fn build_words_for_save(
    request: &SaveRequest,
    text: &str,
    latest: Option<&crate::types::Version>,
) -> (Vec<Word>, Option<TimingAlert>) {
    let mut alert: Option<TimingAlert> = None;

    let sanitized = sanitize_words(&request.words);
    let mut words = if !sanitized.is_empty() && compose_text(&sanitized) == text {
        sanitized
    } else {
        if !sanitized.is_empty()
            && canon_relaxed(&compose_text(&sanitized)) != canon_relaxed(text)
        {
            tracing::debug!(
                save.doc = %request.doc,
                "client tokens diverge beyond whitespace, retokenizing"
            );
        }
        align::carry_over_timings(&sanitized, &tokenize_to_words(text))
    };

    for token in &mut words {
        let fake_start = token.start.is_some_and(align::is_fake_timing);
        let fake_end = token.end.is_some_and(align::is_fake_timing);
        if fake_start || fake_end {
            token.start = None;
            token.end = None;
            alert = Some(TimingAlert::FakeTiming);
        }
    }

    if let Some(parent) = latest {
        words = align::carry_over_timings(&parent.words, &words);
    }

    if align::validate_words(&words).is_err() {
        align::monotonise(&mut words);
        if alert.is_none() {
            alert = Some(TimingAlert::InvalidTiming);
        }
        if let Err(err) = align::validate_words(&words) {
            // Moved text the repair pass cannot reconcile: persist the
            // tokens untimed rather than fail the textual save.
            tracing::warn!(error = %err, "dropping unrecoverable timings on save");
            for token in &mut words {
                token.start = None;
                token.end = None;
            }
        }
    }

    (words, alert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn request(doc: &str, text: &str, words: Vec<Word>) -> SaveRequest {
        SaveRequest::new(doc, text).with_words(words)
    }

    fn parent_version(text: &str, words: Vec<Word>) -> crate::types::Version {
        crate::types::Version {
            version: 1,
            base_sha256: sha256_hex(text),
            text: text.to_string(),
            words,
            created_by: String::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn matching_client_words_are_kept() {
        let words = vec![
            Word::timed("a", 0.0, 0.2),
            Word::plain(" "),
            Word::timed("b", 0.3, 0.5),
        ];
        let (built, alert) = build_words_for_save(&request("d", "a b", words.clone()), "a b", None);
        assert_eq!(built, words);
        assert_eq!(alert, None);
    }

    #[test]
    fn mismatched_words_retokenize_and_donate_timings() {
        // Client words no longer match the text: retokenize, carry times.
        let words = vec![Word::timed("a", 0.0, 0.2), Word::timed("b", 0.3, 0.5)];
        let (built, _) = build_words_for_save(&request("d", "a b", words), "a b", None);
        assert_eq!(compose_text(&built), "a b");
        let a = built.iter().find(|w| w.word == "a").expect("token");
        assert_eq!(a.start, Some(0.0));
    }

    #[test]
    fn fake_timings_strip_and_alert() {
        let words = vec![Word {
            word: "x".into(),
            start: Some(9_999_999_990.5),
            end: Some(9_999_999_991.0),
            probability: None,
        }];
        let (built, alert) = build_words_for_save(&request("d", "x", words), "x", None);
        assert_eq!(alert, Some(TimingAlert::FakeTiming));
        assert_eq!(built[0].start, None);
        assert_eq!(built[0].end, None);
    }

    #[test]
    fn stripped_fakes_recover_prior_times_from_the_parent() {
        let parent = parent_version("x", vec![Word::timed("x", 1.0, 1.5)]);
        let words = vec![Word {
            word: "x".into(),
            start: Some(9_999_999_990.5),
            end: Some(9_999_999_991.0),
            probability: None,
        }];
        let (built, alert) =
            build_words_for_save(&request("d", "x", words), "x", Some(&parent));
        assert_eq!(alert, Some(TimingAlert::FakeTiming));
        assert_eq!(built[0].start, Some(1.0));
        assert_eq!(built[0].end, Some(1.5));
    }

    #[test]
    fn regressions_from_moved_text_are_repaired() {
        // The client swapped two timed words; carried times regress.
        let words = vec![
            Word::timed("late", 5.0, 5.5),
            Word::plain(" "),
            Word::timed("early", 1.0, 1.5),
        ];
        let (built, alert) =
            build_words_for_save(&request("d", "late early", words), "late early", None);
        assert_eq!(alert, Some(TimingAlert::InvalidTiming));
        crate::align::validate_words(&built).expect("repaired sequence validates");
    }
}

fn spawn_align_worker(
    store: Arc<VersionStore>,
    bus: Arc<EventBus>,
    phases: Arc<Mutex<HashMap<String, DocPhase>>>,
    rx: Receiver<AlignTask>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("palimpsest-align".into())
        .spawn(move || {
            while let Ok(task) = rx.recv() {
                match task {
                    AlignTask::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    AlignTask::Align {
                        doc,
                        version,
                        baseline,
                        current,
                        segment,
                        neighbors,
                    } => {
                        let align::WindowAlignment {
                            words,
                            blocks,
                            status,
                        } = align::realign_window(&baseline, &current, segment, neighbors);
                        let status = match status {
                            AlignStatus::Applied { changed, compared } => {
                                match store.apply_alignment(&doc, version, words, blocks) {
                                    Ok(()) => {
                                        bus.publish(&ChangeEvent::TokensUpdated {
                                            doc: doc.clone(),
                                            version,
                                        });
                                        AlignStatus::Applied { changed, compared }
                                    }
                                    Err(err) => {
                                        tracing::warn!(
                                            align.doc = %doc,
                                            align.version = version,
                                            error = %err,
                                            "alignment result discarded, stored timings kept"
                                        );
                                        AlignStatus::Rejected {
                                            reason: err.to_string(),
                                        }
                                    }
                                }
                            }
                            other => other,
                        };

                        bus.publish(&ChangeEvent::AlignmentFinished {
                            doc: doc.clone(),
                            version,
                            status,
                        });
                        if let Ok(mut phases) = phases.lock() {
                            phases.insert(doc, DocPhase::Idle);
                        }
                    }
                }
            }
        })?;
    Ok(handle)
}
