//! Pipeline core scenarios: chaining, cycles, conflicts, deletion cascades, incremental skipping.

use refinery::engine::tools::{file_name, replace_extension};
use refinery::{
    AssetPipeline, BuilderDescriptor, BuilderRegistry, ConfigError, Fingerprint, JobDetails,
    JobStatus, Notification, PipelineConfig, PlatformScope, ProductOutput, ProductOutputFlags,
    SourceState,
};
use std::sync::{Arc, Mutex};

fn fp(s: &str) -> Fingerprint {
    Fingerprint::of_bytes(s.as_bytes())
}

fn intermediate(id: &str, pattern: &str) -> BuilderDescriptor {
    BuilderDescriptor::new(
        id,
        &[pattern],
        PlatformScope::Common,
        ProductOutputFlags::INTERMEDIATE_ASSET,
    )
}

fn product(id: &str, pattern: &str) -> BuilderDescriptor {
    BuilderDescriptor::new(
        id,
        &[pattern],
        PlatformScope::PerPlatform,
        ProductOutputFlags::PRODUCT_ASSET,
    )
}

fn pipeline(builders: Vec<BuilderDescriptor>) -> AssetPipeline {
    let mut registry = BuilderRegistry::new();
    for b in builders {
        registry.register(b).unwrap();
    }
    AssetPipeline::new(Arc::new(registry), PipelineConfig::default())
}

/// Run queued jobs in dispatch order until none remain. Returns how many ran.
fn drain_with(
    p: &mut AssetPipeline,
    emit: impl Fn(&JobDetails) -> Vec<ProductOutput>,
) -> usize {
    let mut ran = 0;
    while let Some(job) = p.take_next_job() {
        let outputs = emit(&job);
        p.on_job_completed(job.id, outputs).unwrap();
        ran += 1;
    }
    ran
}

/// Each builder copies its input, giving it the extension named after the builder's target.
fn drain(p: &mut AssetPipeline, exts: &[(&str, &str)]) -> usize {
    let exts: Vec<(String, String)> = exts
        .iter()
        .map(|(b, e)| (b.to_string(), e.to_string()))
        .collect();
    drain_with(p, move |job| {
        let ext = exts
            .iter()
            .find(|(b, _)| *b == job.builder_id)
            .map(|(_, e)| e.as_str())
            .unwrap();
        vec![ProductOutput::new(
            replace_extension(&job.source_path, ext),
            0,
            job.input_fingerprint,
        )]
    })
}

fn auto_fail_count(p: &AssetPipeline) -> usize {
    p.job_log().iter().filter(|j| j.auto_fail).count()
}

fn two_stage() -> AssetPipeline {
    pipeline(vec![
        intermediate("stage1", "*.stage1"),
        product("stage2", "*.stage2"),
    ])
}

const TWO_STAGE: &[(&str, &str)] = &[("stage1", "stage2"), ("stage2", "stage3")];

fn three_stage() -> AssetPipeline {
    pipeline(vec![
        intermediate("stage1", "*.stage1"),
        intermediate("stage2", "*.stage2"),
        product("stage3", "*.stage3"),
    ])
}

const THREE_STAGE: &[(&str, &str)] = &[
    ("stage1", "stage2"),
    ("stage2", "stage3"),
    ("stage3", "stage4"),
];

// --- registration ---

#[test]
fn test_register_rejects_both_output_flags() {
    let mut r = BuilderRegistry::new();
    let d = BuilderDescriptor::new(
        "both",
        &["*.x"],
        PlatformScope::Common,
        ProductOutputFlags::PRODUCT_ASSET | ProductOutputFlags::INTERMEDIATE_ASSET,
    );
    assert_eq!(
        r.register(d),
        Err(ConfigError::BothOutputFlags {
            builder: "both".into()
        })
    );
    assert!(r.is_empty());
}

#[test]
fn test_register_rejects_missing_output_flag() {
    let mut r = BuilderRegistry::new();
    let d = BuilderDescriptor::new(
        "none",
        &["*.x"],
        PlatformScope::Common,
        ProductOutputFlags::empty(),
    );
    assert!(matches!(
        r.register(d),
        Err(ConfigError::NoOutputFlag { .. })
    ));
}

#[test]
fn test_register_rejects_per_platform_intermediate() {
    let mut r = BuilderRegistry::new();
    let d = BuilderDescriptor::new(
        "pp",
        &["*.x"],
        PlatformScope::PerPlatform,
        ProductOutputFlags::INTERMEDIATE_ASSET,
    );
    assert!(matches!(
        r.register(d),
        Err(ConfigError::IntermediatePerPlatform { .. })
    ));
}

#[test]
fn test_register_rejects_duplicate_id_and_keeps_first() {
    let mut r = BuilderRegistry::new();
    r.register(product("dup", "*.a")).unwrap();
    assert!(matches!(
        r.register(product("dup", "*.b")),
        Err(ConfigError::DuplicateBuilder { .. })
    ));
    assert_eq!(r.len(), 1);
    assert_eq!(r.get("dup").unwrap().patterns, vec!["*.a"]);
}

#[test]
fn test_register_rejects_empty_patterns() {
    let mut r = BuilderRegistry::new();
    let d = BuilderDescriptor::new(
        "empty",
        &[],
        PlatformScope::Common,
        ProductOutputFlags::PRODUCT_ASSET,
    );
    assert!(matches!(r.register(d), Err(ConfigError::NoPatterns { .. })));
}

// --- chaining ---

#[test]
fn test_two_stage_chain_yields_two_jobs_and_platform_product() {
    let mut p = two_stage();
    let outcome = p.on_file_added("test.stage1", fp("a"));
    assert_eq!(outcome.jobs.len(), 1);
    assert_eq!(drain(&mut p, TWO_STAGE), 2);

    assert_eq!(p.job_log().len(), 2);
    assert!(
        p.job_log()
            .iter()
            .all(|j| j.status == JobStatus::Completed && !j.auto_fail)
    );
    let finals: Vec<String> = p
        .graph()
        .products()
        .filter(|prod| !prod.is_intermediate())
        .map(|prod| p.product_file(prod))
        .collect();
    assert_eq!(finals, vec!["Cache/pc/test.stage3".to_string()]);

    let synthetic = p.source_by_path("test.stage2").unwrap();
    assert!(synthetic.produced_by.is_some());
    assert_eq!(synthetic.state, SourceState::Completed);
    assert_eq!(
        p.source_by_path("test.stage1").unwrap().state,
        SourceState::Completed
    );
    assert!(p.is_idle());
}

#[test]
fn test_per_platform_builder_runs_once_per_platform() {
    let mut registry = BuilderRegistry::new();
    registry.register(product("tex", "*.png")).unwrap();
    let config = PipelineConfig {
        platforms: vec!["pc".into(), "linux".into()],
        ..PipelineConfig::default()
    };
    let mut p = AssetPipeline::new(Arc::new(registry), config);
    let outcome = p.on_file_added("art/wall.png", fp("w"));
    assert_eq!(outcome.jobs.len(), 2);
    drain(&mut p, &[("tex", "dds")]);
    let mut files: Vec<String> = p
        .graph()
        .products()
        .map(|prod| p.product_file(prod))
        .collect();
    files.sort();
    assert_eq!(files, vec!["Cache/linux/art/wall.dds", "Cache/pc/art/wall.dds"]);
}

#[test]
fn test_per_platform_without_platforms_is_auto_failed() {
    let mut registry = BuilderRegistry::new();
    registry.register(product("tex", "*.png")).unwrap();
    let config = PipelineConfig {
        platforms: Vec::new(),
        ..PipelineConfig::default()
    };
    let mut p = AssetPipeline::new(Arc::new(registry), config);
    let outcome = p.on_file_added("wall.png", fp("w"));
    assert_eq!(outcome.jobs.len(), 1);
    assert_eq!(p.pending_count(), 0);
    let log = p.job_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].auto_fail);
    assert_eq!(log[0].status, JobStatus::Failed);
    assert_eq!(
        p.source_by_path("wall.png").unwrap().state,
        SourceState::Failed
    );
}

#[test]
fn test_overlong_path_is_auto_failed() {
    let mut registry = BuilderRegistry::new();
    registry.register(product("tex", "*.png")).unwrap();
    let config = PipelineConfig {
        max_path_len: 8,
        ..PipelineConfig::default()
    };
    let mut p = AssetPipeline::new(Arc::new(registry), config);
    p.on_file_added("a/very/long/path.png", fp("w"));
    assert_eq!(p.pending_count(), 0);
    assert_eq!(auto_fail_count(&p), 1);
    assert_eq!(p.job_log()[0].platform, "pc");
}

// --- cycles ---

#[test]
fn test_self_loop_is_auto_failed() {
    let mut p = pipeline(vec![intermediate("loop", "*.loop")]);
    p.on_file_added("test.loop", fp("x"));
    assert_eq!(drain(&mut p, &[("loop", "loop")]), 1);

    assert_eq!(p.job_log().len(), 2);
    assert_eq!(auto_fail_count(&p), 1);
    assert_eq!(p.graph().products().count(), 0);
    assert_eq!(p.graph().source_count(), 1);
    assert_eq!(
        p.source_by_path("test.loop").unwrap().state,
        SourceState::Failed
    );
    assert!(p.is_idle());
}

#[test]
fn test_two_step_loop_fails_offender_and_upstream() {
    let mut p = pipeline(vec![intermediate("a2b", "*.a"), intermediate("b2a", "*.b")]);
    p.on_file_added("test.a", fp("x"));
    assert_eq!(drain(&mut p, &[("a2b", "b"), ("b2a", "a")]), 2);

    // a2b and b2a ran; b2a failed with an entry, a2b got an upstream entry.
    assert_eq!(p.job_log().len(), 4);
    assert_eq!(auto_fail_count(&p), 2);
    let upstream_entry = p
        .jobs_for_path("test.a")
        .into_iter()
        .find(|j| j.auto_fail)
        .unwrap();
    assert_eq!(upstream_entry.builder_id, "a2b");
    assert!(
        upstream_entry
            .fail_reason
            .as_deref()
            .unwrap()
            .contains("output loop")
    );
    assert_eq!(p.graph().source_count(), 2);
    assert!(p.is_idle());
}

#[test]
fn test_three_step_loop_terminates() {
    let mut p = pipeline(vec![
        intermediate("a2b", "*.a"),
        intermediate("b2c", "*.b"),
        intermediate("c2a", "*.c"),
    ]);
    p.on_file_added("test.a", fp("x"));
    let ran = drain(&mut p, &[("a2b", "b"), ("b2c", "c"), ("c2a", "a")]);
    assert_eq!(ran, 3);
    assert_eq!(auto_fail_count(&p), 2);
    assert_eq!(p.graph().source_count(), 3);
    let offender = p
        .jobs_for_path("test.c")
        .into_iter()
        .find(|j| !j.auto_fail)
        .unwrap();
    assert_eq!(offender.status, JobStatus::Failed);
    assert!(p.is_idle());
}

// --- deletion ---

#[test]
fn test_deleting_three_stage_source_removes_exactly_its_artifacts() {
    let mut p = three_stage();
    p.on_file_added("test.stage1", fp("t"));
    p.on_file_added("other.stage3", fp("o"));
    assert_eq!(drain(&mut p, THREE_STAGE), 4);

    let outcome = p.on_file_deleted("test.stage1");
    assert_eq!(outcome.removal.products.len(), 3);
    let mut garbage = outcome.garbage.clone();
    garbage.sort();
    assert_eq!(
        garbage,
        vec![
            "Cache/IntermediateAssets/test.stage2",
            "Cache/IntermediateAssets/test.stage3",
            "Cache/pc/test.stage4",
        ]
    );
    let mut removed = outcome.removal.sources.clone();
    removed.sort();
    assert_eq!(removed, vec!["test.stage1", "test.stage2", "test.stage3"]);

    assert!(p.source_by_path("test.stage2").is_none());
    assert_eq!(p.graph().source_count(), 1);
    assert_eq!(p.products_for_path("other.stage3").len(), 1);
    assert_eq!(p.job_log().len(), 1);
}

#[test]
fn test_deleting_intermediate_file_regenerates_it() {
    let mut p = two_stage();
    p.on_file_added("test.stage1", fp("t"));
    drain(&mut p, TWO_STAGE);

    let outcome = p.on_file_deleted("Cache/IntermediateAssets/test.stage2");
    assert_eq!(outcome.removal.sources, vec!["test.stage2".to_string()]);
    assert_eq!(outcome.garbage, vec!["Cache/pc/test.stage3".to_string()]);
    assert_eq!(outcome.jobs.len(), 1);

    assert_eq!(drain(&mut p, TWO_STAGE), 2);
    assert!(p.source_by_path("test.stage2").is_some());
    assert_eq!(p.graph().products().count(), 2);
}

#[test]
fn test_deleting_product_file_requeues_owner() {
    let mut p = two_stage();
    p.on_file_added("test.stage1", fp("t"));
    drain(&mut p, TWO_STAGE);

    let outcome = p.on_file_deleted("Cache/pc/test.stage3");
    assert_eq!(outcome.jobs.len(), 1);
    let job = p.take_next_job().unwrap();
    assert_eq!(job.source_path, "test.stage2");
    assert!(job.forced);
}

#[test]
fn test_intermediate_folder_delete_spares_unrelated_product() {
    let mut p = pipeline(vec![
        intermediate("gen", "*.src"),
        product("txt", "*.txt"),
        product("prod", "*.b"),
    ]);
    p.on_file_added("a.src", fp("a"));
    p.on_file_added("b.b", fp("b"));
    drain_with(&mut p, |job| {
        let path = match job.builder_id.as_str() {
            "gen" => "folder/child.txt".to_string(),
            "prod" => "folder/product.txt".to_string(),
            _ => replace_extension(&job.source_path, "out"),
        };
        vec![ProductOutput::new(path, 0, job.input_fingerprint)]
    });
    assert!(p.source_by_path("folder/child.txt").is_some());

    let outcome = p.on_folder_deleted("Cache/IntermediateAssets/folder");
    assert_eq!(outcome.removal.sources, vec!["folder/child.txt".to_string()]);
    assert_eq!(outcome.garbage, vec!["Cache/pc/folder/child.out".to_string()]);
    assert!(p.source_by_path("folder/child.txt").is_none());

    let b = p.source_by_path("b.b").unwrap();
    assert_eq!(b.state, SourceState::Completed);
    let kept: Vec<String> = p
        .products_for_path("b.b")
        .iter()
        .map(|prod| p.product_file(prod))
        .collect();
    assert_eq!(kept, vec!["Cache/pc/folder/product.txt".to_string()]);
}

#[test]
fn test_authored_folder_delete_is_component_wise() {
    let mut p = pipeline(vec![product("prod", "*.b")]);
    p.on_file_added("folder/x.b", fp("x"));
    p.on_file_added("folder1/y.b", fp("y"));
    p.on_file_added("folder/sub/z.b", fp("z"));
    drain(&mut p, &[("prod", "out")]);

    let outcome = p.on_folder_deleted("folder");
    assert_eq!(
        outcome.removal.sources,
        vec!["folder/sub/z.b".to_string(), "folder/x.b".to_string()]
    );
    assert_eq!(outcome.removal.products.len(), 2);
    assert!(p.source_by_path("folder1/y.b").is_some());
    assert_eq!(p.products_for_path("folder1/y.b").len(), 1);
}

#[test]
fn test_delete_before_dispatch_drops_queued_job() {
    let mut p = two_stage();
    let added = p.on_file_added("test.stage1", fp("t"));
    assert_eq!(added.jobs.len(), 1);
    assert_eq!(p.pending_count(), 1);

    let outcome = p.on_file_deleted("test.stage1");
    assert_eq!(outcome.removal.dropped_jobs, added.jobs);
    assert!(outcome.removal.orphaned_jobs.is_empty());
    assert!(outcome.garbage.is_empty());
    assert!(p.take_next_job().is_none());
    assert!(p.is_idle());
    assert!(p.job_log().is_empty());
}

#[test]
fn test_completion_after_delete_is_orphaned() {
    let mut p = pipeline(vec![product("prod", "*.b")]);
    p.on_file_added("a.b", fp("a"));
    let job = p.take_next_job().unwrap();
    let outcome = p.on_file_deleted("a.b");
    assert_eq!(outcome.removal.orphaned_jobs, vec![job.id]);
    assert_eq!(p.in_flight_count(), 1);

    let done = p
        .on_job_completed(job.id, vec![ProductOutput::new("a.out", 0, fp("a"))])
        .unwrap();
    assert!(!done.accepted);
    assert_eq!(done.outcome.garbage, vec!["Cache/pc/a.out".to_string()]);
    assert!(p.is_idle());
    assert_eq!(p.graph().products().count(), 0);
}

// --- incremental ---

#[test]
fn test_byte_identical_intermediate_does_not_retrigger() {
    let mut p = two_stage();
    p.on_file_added("test.stage1", fp("v1"));
    let same = |job: &JobDetails| {
        vec![ProductOutput::new(
            replace_extension(&job.source_path, if job.builder_id == "stage1" { "stage2" } else { "stage3" }),
            0,
            fp("identical output"),
        )]
    };
    assert_eq!(drain_with(&mut p, same), 2);

    p.on_file_modified("test.stage1", fp("v2"));
    assert_eq!(drain_with(&mut p, same), 1);
    assert_eq!(p.jobs_for_path("test.stage2").len(), 1);
    assert_eq!(
        p.source_by_path("test.stage2").unwrap().state,
        SourceState::Completed
    );
}

#[test]
fn test_changed_intermediate_retriggers_next_stage() {
    let mut p = two_stage();
    p.on_file_added("test.stage1", fp("v1"));
    drain(&mut p, TWO_STAGE);
    p.on_file_modified("test.stage1", fp("v2"));
    assert_eq!(drain(&mut p, TWO_STAGE), 2);
    assert_eq!(
        p.source_by_path("test.stage2").unwrap().fingerprint,
        fp("v2")
    );
}

#[test]
fn test_unchanged_modify_is_skipped() {
    let mut p = two_stage();
    p.on_file_added("test.stage1", fp("v1"));
    drain(&mut p, TWO_STAGE);
    let outcome = p.on_file_modified("test.stage1", fp("v1"));
    assert!(outcome.jobs.is_empty());
    assert_eq!(p.pending_count(), 0);
}

#[test]
fn test_reprocess_counts_whole_chain_from_any_node() {
    let mut p = three_stage();
    p.on_file_added("test.stage1", fp("t"));
    drain(&mut p, THREE_STAGE);

    assert_eq!(p.request_reprocess("test.stage1"), 3);
    assert_eq!(p.request_reprocess("test.stage2"), 3);
    assert_eq!(p.request_reprocess("Cache/IntermediateAssets/test.stage3"), 3);
    assert_eq!(p.request_reprocess("missing.stage1"), 0);

    assert_eq!(p.dependent_count("test.stage1"), 2);
    assert_eq!(p.dependent_count("test.stage3"), 0);

    assert_eq!(drain(&mut p, THREE_STAGE), 3);
    assert!(p.graph().sources().all(|s| !s.dirty));
    assert!(
        p.graph()
            .sources()
            .all(|s| s.state == SourceState::Completed)
    );
}

#[test]
fn test_stale_completion_is_discarded() {
    let mut p = pipeline(vec![product("prod", "*.b")]);
    p.on_file_added("a.b", fp("v1"));
    let first = p.take_next_job().unwrap();
    p.on_file_modified("a.b", fp("v2"));

    let done = p
        .on_job_completed(first.id, vec![ProductOutput::new("a.out", 0, fp("v1"))])
        .unwrap();
    assert!(!done.accepted);
    assert!(p.graph().job(first.id).is_none());

    assert_eq!(drain(&mut p, &[("prod", "out")]), 1);
    let products = p.products_for_path("a.b");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].fingerprint, fp("v2"));
}

// --- conflicts ---

#[test]
fn test_intermediate_colliding_with_authored_source_is_auto_failed() {
    let mut p = two_stage();
    p.on_file_added("test.stage2", fp("authored"));
    drain(&mut p, TWO_STAGE);
    p.on_file_added("test.stage1", fp("other"));
    drain(&mut p, TWO_STAGE);

    let entries = p.jobs_for_path("test.stage1");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().filter(|j| j.auto_fail).count(), 1);
    assert!(entries.iter().all(|j| j.status == JobStatus::Failed));

    let authored = p.source_by_path("test.stage2").unwrap();
    assert!(authored.produced_by.is_none());
    assert_eq!(authored.state, SourceState::Completed);
    assert_eq!(p.jobs_for_path("test.stage2").len(), 1);
    assert_eq!(p.products_for_path("test.stage2").len(), 1);
}

#[test]
fn test_product_collision_is_first_writer_wins_and_retries_on_release() {
    let mut p = pipeline(vec![product("prod", "*.b")]);
    p.on_file_added("x/a.b", fp("x"));
    p.on_file_added("y/a.b", fp("y"));
    let flat = |job: &JobDetails| {
        vec![ProductOutput::new(
            replace_extension(file_name(&job.source_path), "out"),
            0,
            job.input_fingerprint,
        )]
    };
    drain_with(&mut p, flat);

    let loser = p.jobs_for_path("y/a.b");
    assert_eq!(loser.len(), 2);
    assert_eq!(loser.iter().filter(|j| j.auto_fail).count(), 1);
    assert!(p.products_for_path("y/a.b").is_empty());
    assert_eq!(p.products_for_path("x/a.b").len(), 1);

    let outcome = p.on_file_deleted("x/a.b");
    assert_eq!(outcome.jobs.len(), 1);
    drain_with(&mut p, flat);
    let products = p.products_for_path("y/a.b");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].fingerprint, fp("y"));
}

#[test]
fn test_same_batch_collision_follows_queue_order_not_completion_order() {
    let mut p = pipeline(vec![product("prod", "*.b")]);
    p.on_file_added("x/a.b", fp("x"));
    p.on_file_added("y/a.b", fp("y"));
    let flat = |job: &JobDetails| {
        vec![ProductOutput::new(
            replace_extension(file_name(&job.source_path), "out"),
            0,
            job.input_fingerprint,
        )]
    };
    let x = p.take_next_job().unwrap();
    let y = p.take_next_job().unwrap();
    assert_eq!(x.source_path, "x/a.b");

    let late = p.on_job_completed(y.id, flat(&y)).unwrap();
    assert!(late.accepted);
    let early = p.on_job_completed(x.id, flat(&x)).unwrap();
    assert!(early.accepted);
    assert!(!early.outcome.garbage.contains(&"Cache/pc/a.out".to_string()));

    assert!(p.products_for_path("y/a.b").is_empty());
    let loser = p.jobs_for_path("y/a.b");
    assert_eq!(loser.len(), 2);
    assert_eq!(loser.iter().filter(|j| j.auto_fail).count(), 1);
    assert!(loser.iter().all(|j| j.status == JobStatus::Failed));
    assert_eq!(p.source_by_path("y/a.b").unwrap().state, SourceState::Failed);

    // x runs again so its content is the one left in the shared file.
    assert_eq!(p.pending_count(), 1);
    drain_with(&mut p, flat);
    let products = p.products_for_path("x/a.b");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].fingerprint, fp("x"));

    p.on_file_deleted("x/a.b");
    drain_with(&mut p, flat);
    let products = p.products_for_path("y/a.b");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].fingerprint, fp("y"));
}

#[test]
fn test_duplicate_sub_id_is_auto_failed() {
    let mut p = pipeline(vec![product("split", "*.pak")]);
    p.on_file_added("a.pak", fp("a"));
    drain_with(&mut p, |_| {
        vec![
            ProductOutput::new("a.0", 7, fp("0")),
            ProductOutput::new("a.1", 7, fp("1")),
        ]
    });
    assert_eq!(auto_fail_count(&p), 1);
    assert!(p.products_for_path("a.pak").is_empty());
}

#[test]
fn test_authored_file_on_intermediate_path_waits_for_release() {
    let mut p = two_stage();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    p.set_listener(Box::new(move |n: &Notification| {
        if let Notification::SourceRejected { path, .. } = n {
            sink.lock().unwrap().push(path.clone());
        }
    }));
    p.on_file_added("test.stage1", fp("t"));
    drain(&mut p, TWO_STAGE);

    let outcome = p.on_file_added("test.stage2", fp("hand-made"));
    assert!(outcome.jobs.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec!["test.stage2".to_string()]);
    assert!(p.source_by_path("test.stage2").unwrap().produced_by.is_some());

    p.on_file_deleted("test.stage1");
    let authored = p.source_by_path("test.stage2").unwrap();
    assert!(authored.produced_by.is_none());
    assert_eq!(authored.fingerprint, fp("hand-made"));
    assert_eq!(p.pending_count(), 1);
}
