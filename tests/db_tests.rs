//! Checkpoint tests: snapshot save/load, restore, reconcile against a scan, file-DB fixture.

use refinery::engine::tools::replace_extension;
use refinery::engine::{load_snapshot, open_db, open_db_in_memory, save_snapshot};
use refinery::{
    AssetPipeline, BuilderDescriptor, BuilderRegistry, FileEvent, Fingerprint, PipelineConfig,
    PlatformScope, ProductOutput, ProductOutputFlags, SourceState,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn registry() -> Arc<BuilderRegistry> {
    let mut r = BuilderRegistry::new();
    r.register(BuilderDescriptor::new(
        "stage1",
        &["*.stage1"],
        PlatformScope::Common,
        ProductOutputFlags::INTERMEDIATE_ASSET,
    ))
    .unwrap();
    r.register(BuilderDescriptor::new(
        "stage2",
        &["*.stage2"],
        PlatformScope::PerPlatform,
        ProductOutputFlags::PRODUCT_ASSET,
    ))
    .unwrap();
    Arc::new(r)
}

fn run_all(p: &mut AssetPipeline) {
    while let Some(job) = p.take_next_job() {
        let ext = if job.builder_id == "stage1" {
            "stage2"
        } else {
            "stage3"
        };
        let out = ProductOutput::new(
            replace_extension(&job.source_path, ext),
            0,
            job.input_fingerprint,
        );
        p.on_job_completed(job.id, vec![out]).unwrap();
    }
}

fn built() -> AssetPipeline {
    let mut p = AssetPipeline::new(registry(), PipelineConfig::default());
    p.on_file_added("test.stage1", Fingerprint::of_bytes(b"A"));
    run_all(&mut p);
    p
}

#[test]
fn test_fresh_db_has_no_snapshot() {
    let conn = open_db_in_memory().unwrap();
    assert!(load_snapshot(&conn).unwrap().is_none());
}

#[test]
fn test_snapshot_round_trip_through_db() {
    let p = built();
    let snap = p.snapshot();
    let mut conn = open_db_in_memory().unwrap();
    save_snapshot(&mut conn, &snap).unwrap();
    let loaded = load_snapshot(&conn).unwrap().unwrap();

    assert_eq!(loaded.sources.len(), 2);
    assert_eq!(loaded.jobs.len(), 2);
    assert_eq!(loaded.products.len(), 2);
    assert_eq!(loaded.fingerprints.len(), snap.fingerprints.len());
    assert_eq!(loaded.last_job, snap.last_job);
    assert_eq!(loaded.pass, snap.pass);

    let synthetic = loaded
        .sources
        .iter()
        .find(|s| s.path == "test.stage2")
        .unwrap();
    assert!(synthetic.produced_by.is_some());
    assert!(synthetic.produced_by_product.is_some());
    assert_eq!(synthetic.state, SourceState::Completed);
    assert!(loaded.jobs.iter().any(|j| j.intermediate));
    assert!(loaded.products.iter().any(|prod| prod.is_intermediate()));
}

#[test]
fn test_save_replaces_previous_snapshot() {
    let mut conn = open_db_in_memory().unwrap();
    save_snapshot(&mut conn, &built().snapshot()).unwrap();
    let empty = AssetPipeline::new(registry(), PipelineConfig::default());
    save_snapshot(&mut conn, &empty.snapshot()).unwrap();
    let loaded = load_snapshot(&conn).unwrap().unwrap();
    assert!(loaded.sources.is_empty());
    assert!(loaded.jobs.is_empty());
}

#[test]
fn test_schema_mismatch_discards_checkpoint() {
    let mut conn = open_db_in_memory().unwrap();
    save_snapshot(&mut conn, &built().snapshot()).unwrap();
    conn.execute(
        "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
        [9999_i64],
    )
    .unwrap();
    assert!(load_snapshot(&conn).unwrap().is_none());
}

#[test]
fn test_restored_pipeline_skips_unchanged_work() {
    let snap = built().snapshot();
    let last_job = snap.last_job;
    let mut restored = AssetPipeline::restore(registry(), PipelineConfig::default(), snap);

    assert_eq!(restored.graph().source_count(), 2);
    assert_eq!(restored.graph().products().count(), 2);

    let same = restored.on_file_modified("test.stage1", Fingerprint::of_bytes(b"A"));
    assert!(same.jobs.is_empty());

    let changed = restored.on_file_modified("test.stage1", Fingerprint::of_bytes(b"B"));
    assert_eq!(changed.jobs.len(), 1);
    assert!(changed.jobs[0].0 > last_job);
}

#[test]
fn test_reconcile_unchanged_tree_yields_nothing() {
    let p = built();
    let a = Fingerprint::of_bytes(b"A");
    let current: BTreeMap<String, Fingerprint> = [
        ("test.stage1", a),
        ("Cache/IntermediateAssets/test.stage2", a),
        ("Cache/pc/test.stage3", Fingerprint::of_bytes(b"X")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    assert!(p.reconcile(&current).is_empty());
}

#[test]
fn test_reconcile_orders_deletions_first() {
    let p = built();
    let a = Fingerprint::of_bytes(b"A");
    let n = Fingerprint::of_bytes(b"N");
    let current: BTreeMap<String, Fingerprint> = [
        ("Cache/IntermediateAssets/test.stage2", a),
        ("new.stage1", n),
        ("Cache/pc/stray.bin", n),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let events = p.reconcile(&current);
    assert_eq!(
        events,
        vec![
            FileEvent::Deleted {
                path: "Cache/pc/test.stage3".into()
            },
            FileEvent::Deleted {
                path: "test.stage1".into()
            },
            FileEvent::Added {
                path: "new.stage1".into(),
                fingerprint: n
            },
        ]
    );
}

#[test]
fn test_unfinished_work_is_redone_after_restore() {
    let mut p = AssetPipeline::new(registry(), PipelineConfig::default());
    let a = Fingerprint::of_bytes(b"A");
    p.on_file_added("test.stage1", a);
    let snap = p.snapshot();
    assert!(snap.jobs.is_empty());
    assert!(snap.sources[0].dirty);

    let restored = AssetPipeline::restore(registry(), PipelineConfig::default(), snap);
    let current: BTreeMap<String, Fingerprint> =
        [("test.stage1".to_string(), a)].into_iter().collect();
    assert_eq!(
        restored.reconcile(&current),
        vec![FileEvent::Modified {
            path: "test.stage1".into(),
            fingerprint: a
        }]
    );
}

#[test]
fn test_file_db_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.db");
    {
        let mut conn = open_db(&path).unwrap();
        save_snapshot(&mut conn, &built().snapshot()).unwrap();
    }
    let conn = open_db(&path).unwrap();
    let loaded = load_snapshot(&conn).unwrap().unwrap();
    assert_eq!(loaded.sources.len(), 2);
}
