//! End-to-end save scenarios over the in-memory backend.

use std::sync::Arc;

use palimpsest_core::diff::{Op, OpKind};
use palimpsest_core::types::{
    AlignStatus, ChangeEvent, ConflictReason, SaveOutcome, SaveRequest, TimingAlert, VerifyOutcome,
    Word,
};
use palimpsest_core::{MemoryStore, TranscriptEngine};

fn engine() -> TranscriptEngine {
    TranscriptEngine::new(Arc::new(MemoryStore::new())).expect("engine")
}

fn saved(outcome: SaveOutcome) -> palimpsest_core::types::SavedVersion {
    match outcome {
        SaveOutcome::Saved(saved) => saved,
        other => panic!("expected a committed save, got {other:?}"),
    }
}

#[test]
fn basic_edit_appends_a_version() {
    let engine = engine();
    let doc = "show/episode-01.opus";

    let v1 = saved(
        engine
            .save(SaveRequest::new(doc, "hello world"))
            .expect("first save"),
    );
    assert_eq!(v1.version, 1);

    let v2 = saved(
        engine
            .save(SaveRequest::new(doc, "hello world!").on_parent(1, v1.base_sha256.clone()))
            .expect("second save"),
    );
    assert_eq!(v2.version, 2);
    assert!(matches!(v2.verify, VerifyOutcome::Ok { .. }));

    let edits = engine.edits(doc).expect("edits");
    assert_eq!(edits.len(), 1);
    assert_eq!(
        edits[0].text_ops,
        vec![Op::equal("hello world"), Op::insert("!")]
    );

    let loaded = engine.load(doc).expect("load");
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.text, "hello world!");
    assert_eq!(loaded.base_sha256, v2.base_sha256);
}

#[test]
fn no_op_save_returns_no_change() {
    let engine = engine();
    let doc = "show/episode-02.opus";

    let v1 = saved(engine.save(SaveRequest::new(doc, "stable text")).expect("v1"));
    let outcome = engine
        .save(SaveRequest::new(doc, "stable text").on_parent(1, v1.base_sha256))
        .expect("no-op save");
    assert!(matches!(outcome, SaveOutcome::NoChange));
    assert_eq!(engine.history(doc).expect("history").len(), 1);
}

#[test]
fn conflict_then_auto_merge_then_save() {
    let engine = engine();
    let doc = "show/episode-03.opus";

    let v1 = saved(
        engine
            .save(SaveRequest::new(doc, "alpha bravo charlie"))
            .expect("v1"),
    );
    // Another writer lands v2 first.
    let v2 = saved(
        engine
            .save(
                SaveRequest::new(doc, "alpha bravo charlie delta")
                    .on_parent(1, v1.base_sha256.clone()),
            )
            .expect("other writer"),
    );

    // Our client still edits on top of v1.
    let outcome = engine
        .save(SaveRequest::new(doc, "alpha BRAVO charlie").on_parent(1, v1.base_sha256))
        .expect("conflicting save");
    let conflict = match outcome {
        SaveOutcome::Conflict(info) => info,
        other => panic!("expected a conflict, got {other:?}"),
    };
    assert_eq!(conflict.reason, ConflictReason::VersionConflict);
    assert_eq!(conflict.latest.as_ref().map(|m| m.version), Some(2));
    assert_eq!(conflict.parent.as_ref().map(|m| m.version), Some(1));
    assert!(!conflict.diff_parent_to_latest.is_empty());
    assert!(!conflict.diff_parent_to_client.is_empty());

    // The two edit streams are disjoint, so they compose.
    let merged = match engine
        .merge_conflict(&conflict, "alpha BRAVO charlie")
        .expect("merge")
    {
        palimpsest_core::diff::MergeOutcome::Merged { text } => text,
        other => panic!("expected a merge, got {other:?}"),
    };
    assert_eq!(merged, "alpha BRAVO charlie delta");

    let v3 = saved(
        engine
            .save(SaveRequest::new(doc, merged).on_parent(2, v2.base_sha256))
            .expect("merged save"),
    );
    assert_eq!(v3.version, 3);
    assert!(matches!(v3.verify, VerifyOutcome::Ok { .. }));
}

#[test]
fn overlapping_conflict_is_unmergeable() {
    let engine = engine();
    let doc = "show/episode-04.opus";

    let v1 = saved(
        engine
            .save(SaveRequest::new(doc, "alpha bravo charlie"))
            .expect("v1"),
    );
    saved(
        engine
            .save(SaveRequest::new(doc, "alpha beta charlie").on_parent(1, v1.base_sha256.clone()))
            .expect("other writer"),
    );

    let outcome = engine
        .save(SaveRequest::new(doc, "alpha BRAVO charlie").on_parent(1, v1.base_sha256))
        .expect("conflicting save");
    let conflict = match outcome {
        SaveOutcome::Conflict(info) => info,
        other => panic!("expected a conflict, got {other:?}"),
    };

    match engine
        .merge_conflict(&conflict, "alpha BRAVO charlie")
        .expect("merge attempt")
    {
        palimpsest_core::diff::MergeOutcome::Unmergeable { conflicts } => {
            assert!(!conflicts.is_empty());
        }
        palimpsest_core::diff::MergeOutcome::Merged { text } => {
            panic!("overlapping edits must not merge, got {text:?}")
        }
    }
    // No third version was written.
    assert_eq!(engine.history(doc).expect("history").len(), 2);
}

#[test]
fn fake_timings_are_stripped_but_the_text_commits() {
    let engine = engine();
    let doc = "show/episode-05.opus";

    let v1_words = vec![
        Word::timed("hello", 0.0, 0.5),
        Word::timed(" ", 0.5, 0.6),
        Word::timed("world", 0.6, 1.1),
    ];
    let v1 = saved(
        engine
            .save(SaveRequest::new(doc, "hello world").with_words(v1_words))
            .expect("v1"),
    );

    let poisoned = vec![
        Word::timed("hello", 0.0, 0.5),
        Word::plain(" "),
        Word {
            word: "world!".into(),
            start: Some(9_999_999_990.1),
            end: Some(9_999_999_990.3),
            probability: None,
        },
    ];
    let v2 = saved(
        engine
            .save(
                SaveRequest::new(doc, "hello world!")
                    .on_parent(1, v1.base_sha256)
                    .with_words(poisoned),
            )
            .expect("save with fake timings"),
    );
    assert_eq!(v2.version, 2);
    assert_eq!(v2.timing_alert, Some(TimingAlert::FakeTiming));

    // The text version is durable and the sentinel never reached the store.
    let words = engine.words(doc, 2, None, None).expect("words");
    let world = words.iter().find(|w| w.word == "world!").expect("token");
    assert!(world.start.map_or(true, |s| s < 1_000_000.0));
    let hello = words.iter().find(|w| w.word == "hello").expect("token");
    assert_eq!(hello.start, Some(0.0));
}

#[test]
fn background_alignment_updates_tokens() {
    let engine = engine();
    let doc = "show/episode-06.opus";

    let v1_words = vec![
        Word::timed("alpha", 0.0, 0.4),
        Word::timed(" ", 0.4, 0.5),
        Word::timed("bravo", 0.5, 0.9),
        Word::newline(),
        Word::timed("charlie", 1.0, 1.4),
        Word::timed(" ", 1.4, 1.5),
        Word::timed("delta", 1.5, 1.9),
    ];
    let v1 = saved(
        engine
            .save(SaveRequest::new(doc, "alpha bravo\ncharlie delta").with_words(v1_words))
            .expect("v1"),
    );

    let events = engine.subscribe();
    let mut request = SaveRequest::new(doc, "alpha BRAVO\ncharlie delta")
        .on_parent(1, v1.base_sha256)
        .at_segment(0);
    request.neighbors = 1;
    let v2 = saved(engine.save(request).expect("v2"));
    assert_eq!(v2.version, 2);

    engine.flush_alignment();

    // The replacement word picked up times between its surviving anchors.
    let words = engine.words(doc, 2, None, None).expect("words");
    let bravo = words.iter().find(|w| w.word == "BRAVO").expect("token");
    assert!(bravo.start.is_some(), "aligned word carries a start");
    assert!(bravo.start.unwrap() >= 0.4 - 1e-3);
    // Untouched words kept their times.
    let charlie = words.iter().find(|w| w.word == "charlie").expect("token");
    assert_eq!(charlie.start, Some(1.0));

    // The bus saw the commit and the alignment.
    let mut saw_version = false;
    let mut saw_alignment = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ChangeEvent::VersionChanged { version: 2, .. } => saw_version = true,
            ChangeEvent::AlignmentFinished { version: 2, status, .. } => {
                assert!(matches!(status, AlignStatus::Applied { .. }));
                saw_alignment = true;
            }
            _ => {}
        }
    }
    assert!(saw_version, "VersionChanged published");
    assert!(saw_alignment, "AlignmentFinished published");

    // The timing blocks landed on the v1 -> v2 edit record.
    let edits = engine.edits(doc).expect("edits");
    let blocks = edits[0].timing_ops.as_ref().expect("timing ops recorded");
    assert!(!blocks.is_empty());
    assert!(blocks[0].items.iter().any(|d| d.word == "BRAVO"));
}

#[test]
fn confirmations_are_hash_gated() {
    let engine = engine();
    let doc = "show/episode-07.opus";

    let v1 = saved(engine.save(SaveRequest::new(doc, "abc def")).expect("v1"));

    // Wrong hash: the client must save first.
    let err = engine
        .save_confirmations(doc, 1, "deadbeef", &[(0, 3)], "abc def")
        .expect_err("hash gate");
    assert!(matches!(
        err,
        palimpsest_core::EngineError::HashMismatch { .. }
    ));

    // Stale text with the right stored hash is also rejected.
    let err = engine
        .save_confirmations(doc, 1, &v1.base_sha256, &[(0, 3)], "abc xyz")
        .expect_err("text proof");
    assert!(matches!(
        err,
        palimpsest_core::EngineError::HashMismatch { .. }
    ));

    let count = engine
        .save_confirmations(doc, 1, &v1.base_sha256, &[(0, 3), (4, 7)], "abc def")
        .expect("confirm");
    assert_eq!(count, 2);

    let stored = engine.confirmations(doc, 1).expect("read back");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].exact, "abc");
    assert_eq!(stored[1].exact, "def");
    assert_eq!(stored[0].base_sha256, v1.base_sha256);

    // Replacement is en bloc.
    engine
        .save_confirmations(doc, 1, &v1.base_sha256, &[(4, 7)], "abc def")
        .expect("replace");
    assert_eq!(engine.confirmations(doc, 1).expect("after").len(), 1);
}

#[test]
fn missing_parent_is_rejected_on_existing_documents() {
    let engine = engine();
    let doc = "show/episode-08.opus";
    saved(engine.save(SaveRequest::new(doc, "first")).expect("v1"));

    let outcome = engine
        .save(SaveRequest::new(doc, "second"))
        .expect("parentless save");
    match outcome {
        SaveOutcome::Conflict(info) => assert_eq!(info.reason, ConflictReason::MissingParent),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn words_read_pages_by_segment() {
    let engine = engine();
    let doc = "show/episode-09.opus";
    saved(
        engine
            .save(SaveRequest::new(doc, "zero zero\none one\ntwo two"))
            .expect("v1"),
    );

    let page = engine.words(doc, 1, Some(1), Some(1)).expect("page");
    let text: String = page.iter().map(|w| w.word.as_str()).collect();
    assert_eq!(text, "one one");
}

#[test]
fn corrections_cache_tracks_saves() {
    let engine = engine();
    let doc = "show/episode-10.opus";
    assert!(!engine.has_corrections(doc));
    saved(engine.save(SaveRequest::new(doc, "text")).expect("v1"));
    assert!(engine.has_corrections(doc));
}

#[test]
fn diff_ops_serialize_as_code_payload_pairs() {
    let ops = vec![Op::equal("keep"), Op::delete("x"), Op::insert("y")];
    let json = serde_json::to_string(&ops).expect("serialize");
    assert_eq!(json, r#"[[0,"keep"],[-1,"x"],[1,"y"]]"#);
    let back: Vec<Op> = serde_json::from_str(&json).expect("parse");
    assert_eq!(back[1].kind, OpKind::Delete);
}
