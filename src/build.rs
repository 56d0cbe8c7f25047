//! Build a project directory: restore the checkpoint, scan, run jobs until the graph settles,
//! checkpoint again.

use anyhow::Result;
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use crate::Opts;
use crate::engine::core::{AssetPipeline, Notification};
use crate::engine::db_ops::{load_snapshot, open_db, save_snapshot};
use crate::engine::progress::{
    ProgressBar, create_progress_bar, set_bar_total, update_progress_bar,
};
use crate::engine::tools::check_root_and_canonicalize;
use crate::pipeline::{Command, Orchestrator, collect_scan};
use crate::registry::BuilderRegistry;
use crate::runner::{LocalRunner, TransformSet};
use crate::types::{JobDetails, JobStatus, PipelineConfig};
use crate::utils::config::{PackagePaths, WorkerThreadLimits};
use crate::utils::fd_limit::capped_workers;
use crate::utils::refinery_toml::BuilderConfig;
use crate::utils::tempfiles::{CheckpointTarget, temp_path_for};

/// What one build did.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Job log at the end of the build, in id order.
    pub jobs: Vec<JobDetails>,
    pub completed: usize,
    pub failed: usize,
    pub garbage_removed: usize,
}

impl BuildReport {
    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobDetails> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Failed)
    }
}

/// Checkpoint path for `root`: explicit `db_path` or the package default inside the project.
pub fn db_path_for(root: &Path, opts: &Opts) -> PathBuf {
    opts.db_path
        .clone()
        .unwrap_or_else(|| root.join(PackagePaths::get().output_filename()))
}

/// Register configured builders. Invalid ones are logged and skipped.
pub fn register_builders(builders: &[BuilderConfig]) -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();
    for b in builders {
        if let Err(e) = registry.register(b.descriptor.clone()) {
            warn!("Skipping builder: {e}");
        }
    }
    registry
}

/// Restore the pipeline from the checkpoint at `db_path`, or start empty when there is none.
pub fn load_pipeline(
    db_path: &Path,
    registry: Arc<BuilderRegistry>,
    config: PipelineConfig,
) -> Result<AssetPipeline> {
    if !db_path.exists() {
        debug!("No checkpoint at {}", db_path.display());
        return Ok(AssetPipeline::new(registry, config));
    }
    let conn = open_db(db_path)?;
    match load_snapshot(&conn)? {
        Some(snapshot) => {
            debug!(
                "Restoring {} sources, {} jobs, {} products",
                snapshot.sources.len(),
                snapshot.jobs.len(),
                snapshot.products.len()
            );
            Ok(AssetPipeline::restore(registry, config, snapshot))
        }
        None => Ok(AssetPipeline::new(registry, config)),
    }
}

/// Write the pipeline's snapshot to `db_path` through a temp file renamed into place.
pub fn checkpoint(pipeline: &AssetPipeline, db_path: &Path) -> Result<()> {
    let target = CheckpointTarget::prepare(db_path)?;
    let snapshot = pipeline.snapshot();
    {
        let mut conn = open_db(target.work_path())?;
        save_snapshot(&mut conn, &snapshot)?;
    }
    target.finish()?;
    debug!(
        "Checkpointed {} sources to {}",
        snapshot.sources.len(),
        db_path.display()
    );
    Ok(())
}

/// Cancel flag shared with the Ctrl+C handler. The handler is installed once per process.
fn cancel_flag() -> Result<Arc<AtomicBool>> {
    static FLAG: OnceLock<std::result::Result<Arc<AtomicBool>, String>> = OnceLock::new();
    let installed = FLAG.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        let handler_flag = Arc::clone(&flag);
        ctrlc::set_handler(move || {
            handler_flag.store(true, Ordering::Relaxed);
        })
        .map(|()| flag)
        .map_err(|e| e.to_string())
    });
    match installed {
        Ok(flag) => {
            flag.store(false, Ordering::Relaxed);
            Ok(Arc::clone(flag))
        }
        Err(e) => Err(anyhow::anyhow!("set Ctrl+C handler: {e}")),
    }
}

/// Job progress: total grows as jobs are queued, advances when a queued job finishes.
fn progress_listener(bar: ProgressBar) -> Box<dyn FnMut(&Notification) + Send> {
    let mut queued = HashSet::new();
    let mut total = 0_usize;
    Box::new(move |n| match n {
        Notification::JobQueued(job) => {
            queued.insert(job.id);
            total += 1;
            set_bar_total(&bar, total);
        }
        Notification::JobCompleted(job) | Notification::JobFailed(job) => {
            if queued.remove(&job.id) {
                update_progress_bar(&bar, 1);
            }
        }
        _ => {}
    })
}

/// Build `root` with `builders`: scan, reconcile against the checkpoint, run every job to
/// completion on the local runner and checkpoint the result.
pub fn build_dir(root: &Path, opts: &Opts, builders: &[BuilderConfig]) -> Result<BuildReport> {
    let root = check_root_and_canonicalize(root)?;
    let db_path = db_path_for(&root, opts);
    let registry = Arc::new(register_builders(builders));
    if registry.is_empty() {
        warn!("No builders configured; nothing will be built");
    }
    let mut pipeline = load_pipeline(&db_path, Arc::clone(&registry), opts.pipeline.clone())?;
    if opts.verbose {
        pipeline.set_listener(progress_listener(create_progress_bar(0, "Building")));
    }

    let transforms = Arc::new(TransformSet::from_builders(builders));
    let workers = capped_workers(opts.workers, WorkerThreadLimits::current().workers());
    let (cmd_tx, cmd_rx) = unbounded::<Command>();
    let (job_tx, job_rx) = unbounded::<JobDetails>();
    let cancel = cancel_flag()?;

    let runner = LocalRunner::spawn(
        &root,
        opts.pipeline.clone(),
        transforms,
        opts.with_hash,
        workers,
        job_rx,
        cmd_tx.clone(),
    );

    let scan_handle = {
        let cmd_tx = cmd_tx.clone();
        let root = root.clone();
        let opts = opts.clone();
        let skip = vec![db_path.clone(), temp_path_for(&db_path)];
        thread::spawn(move || {
            let _ = cmd_tx.send(Command::ScanStarted);
            let cmd = match collect_scan(&root, &opts, &skip) {
                Ok(current) => Command::ScanFinished { current },
                Err(e) => Command::ScanFailed {
                    error: format!("{e:#}"),
                },
            };
            let _ = cmd_tx.send(cmd);
        })
    };
    drop(cmd_tx);

    info!("Building {} with {} workers", root.display(), workers);
    let result = Orchestrator::new(pipeline, &root, cmd_rx, job_tx, workers, true)
        .with_reprocess(opts.reprocess.clone())
        .with_cancel(Arc::clone(&cancel))
        .run();
    runner.join();
    let _ = scan_handle.join();

    if let Some(error) = result.scan_error {
        return Err(anyhow::anyhow!("scan of {} failed: {error}", root.display()));
    }

    checkpoint(&result.pipeline, &db_path)?;

    let jobs: Vec<JobDetails> = result.pipeline.job_log().into_iter().cloned().collect();
    let report = BuildReport {
        completed: jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count(),
        failed: jobs.iter().filter(|j| j.status == JobStatus::Failed).count(),
        garbage_removed: result.garbage_removed,
        jobs,
    };
    if result.cancelled {
        return Err(anyhow::anyhow!(
            "Build cancelled by user; finished work was checkpointed"
        ));
    }
    Ok(report)
}
