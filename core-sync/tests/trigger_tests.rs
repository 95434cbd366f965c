//! Integration tests for build trigger batches
//!
//! These tests verify:
//! - Per-delta outcomes with partial failure
//! - Coalescing of repeated deltas and the changed-to-add fallback
//! - Full rescans on request or when one is owed
//! - Cancellation between deltas

mod common;

use common::*;
use core_sync::{
    BuildTrigger, DeltaEffect, ErrorCategory, FileDelta, IncrementalSyncEngine, RescanOutcome,
};
use tokio_util::sync::CancellationToken;

async fn created_engine() -> (Harness, IncrementalSyncEngine) {
    let h = harness(MemoryFs::with_files(&scenario_files()), Some(tag_scanner()));
    let engine = IncrementalSyncEngine::new(settings(&["src"]), h.context.clone());
    engine.create().await.unwrap();
    (h, engine)
}

#[tokio::test]
async fn test_batch_reports_each_delta() {
    let (h, engine) = created_engine().await;
    h.fs.put("src/new.c", "int n;\n");
    h.fs.put("src/locked.c", "int l;\n");
    h.fs.make_unreadable("src/locked.c");
    h.fs.remove("src/b.c");
    h.fs.put("src/a.c", "int changed;\n");

    let report = engine
        .apply_trigger(
            BuildTrigger::Deltas(vec![
                FileDelta::added("src/new.c"),
                FileDelta::added("src/locked.c"),
                FileDelta::removed("src/b.c"),
                FileDelta::changed("src/a.c"),
                FileDelta::added("bin/g.o"),
            ]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.rescan.is_none());
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.applied(), 3);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].delta.path, "src/locked.c");
    assert_eq!(
        failures[0].outcome.as_ref().unwrap_err().category(),
        ErrorCategory::ResourceAccess
    );
    assert!(matches!(report.results[4].outcome, Ok(DeltaEffect::Ignored)));

    assert!(report.saved.is_some());
    assert!(!engine.is_dirty().await.unwrap());
    assert_eq!(
        engine.file_references().await.unwrap(),
        vec!["src/a.c", "src/new.c", "src/subdir/c.c", "src/subdir/d.c"]
    );
}

#[tokio::test]
async fn test_repeated_deltas_keep_last() {
    let (h, engine) = created_engine().await;
    h.fs.put("src/tmp.c", "int t;\n");

    let report = engine
        .apply_trigger(
            BuildTrigger::Deltas(vec![
                FileDelta::added("src/tmp.c"),
                FileDelta::changed("src/tmp.c"),
                FileDelta::removed("src/tmp.c"),
            ]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(matches!(report.results[0].outcome, Ok(DeltaEffect::Ignored)));
    assert!(!engine.has_record("src/tmp.c").await.unwrap());
}

#[tokio::test]
async fn test_changed_without_record_is_added() {
    let (h, engine) = created_engine().await;
    h.fs.put("src/subdir/e.c", "int e;\n");

    let report = engine
        .apply_trigger(
            BuildTrigger::Deltas(vec![FileDelta::changed("src/subdir/e.c")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(matches!(report.results[0].outcome, Ok(DeltaEffect::Applied)));
    assert!(engine.has_record("src/subdir/e.c").await.unwrap());
}

#[tokio::test]
async fn test_full_rescan_requested() {
    let (h, engine) = created_engine().await;
    h.fs.put("src/late.c", "int late;\n");

    let report = engine
        .apply_trigger(BuildTrigger::FullRescanRequested, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        report.rescan,
        Some(RescanOutcome::Completed { files: 5, .. })
    ));
    assert!(report.results.is_empty());
    assert!(report.saved.is_some());
}

#[tokio::test]
async fn test_owed_rescan_replaces_deltas() {
    let (h, engine) = created_engine().await;
    engine.mark_rescan_required().await.unwrap();
    h.fs.put("src/late.c", "int late;\n");
    h.fs.put("src/other.c", "int other;\n");

    let report = engine
        .apply_trigger(
            BuildTrigger::Deltas(vec![FileDelta::added("src/late.c")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.rescan.as_ref().is_some_and(RescanOutcome::is_completed));
    assert!(engine.has_record("src/other.c").await.unwrap());
    assert!(!engine.is_file_rescan_required().await.unwrap());
}

#[tokio::test]
async fn test_cancelled_batch_owes_rescan() {
    let (h, engine) = created_engine().await;
    h.fs.put("src/new.c", "int n;\n");
    let token = CancellationToken::new();
    token.cancel();

    let report = engine
        .apply_trigger(
            BuildTrigger::Deltas(vec![FileDelta::added("src/new.c")]),
            &token,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.results.is_empty());
    assert!(report.saved.is_none());
    assert!(engine.is_file_rescan_required().await.unwrap());
    assert!(!engine.has_record("src/new.c").await.unwrap());
}
