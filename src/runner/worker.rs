//! Local runner: worker threads that execute dispatched jobs and report back to the orchestrator.

use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::pipeline::Command;
use crate::types::{JobDetails, PipelineConfig, ProductOutput};

use super::transform::{TransformContext, TransformSet};

/// Where a worker finds inputs and puts outputs.
#[derive(Clone)]
struct RunnerEnv {
    root: PathBuf,
    config: PipelineConfig,
    transforms: Arc<TransformSet>,
    with_hash: bool,
}

pub struct LocalRunner {
    handles: Vec<JoinHandle<()>>,
}

impl LocalRunner {
    /// Spawn `workers` threads. They exit when every `job_rx` sender is dropped.
    pub fn spawn(
        root: &Path,
        config: PipelineConfig,
        transforms: Arc<TransformSet>,
        with_hash: bool,
        workers: usize,
        job_rx: Receiver<JobDetails>,
        cmd_tx: Sender<Command>,
    ) -> Self {
        let env = RunnerEnv {
            root: root.to_path_buf(),
            config,
            transforms,
            with_hash,
        };
        let handles = (0..workers.max(1))
            .map(|_| {
                let env = env.clone();
                let job_rx = job_rx.clone();
                let cmd_tx = cmd_tx.clone();
                thread::spawn(move || worker_loop(env, job_rx, cmd_tx))
            })
            .collect();
        LocalRunner { handles }
    }

    pub fn join(self) {
        for h in self.handles {
            let _ = h.join();
        }
    }
}

fn worker_loop(env: RunnerEnv, job_rx: Receiver<JobDetails>, cmd_tx: Sender<Command>) {
    while let Ok(job) = job_rx.recv() {
        let cmd = match run_job(&env, &job) {
            Ok(outputs) => Command::JobCompleted {
                job: job.id,
                outputs,
            },
            Err(e) => Command::JobFailed {
                job: job.id,
                reason: format!("{e:#}"),
            },
        };
        if cmd_tx.send(cmd).is_err() {
            break;
        }
    }
}

fn run_job(env: &RunnerEnv, job: &JobDetails) -> anyhow::Result<Vec<ProductOutput>> {
    let transform = env
        .transforms
        .get(&job.builder_id)
        .ok_or_else(|| anyhow::anyhow!("no transform for builder '{}'", job.builder_id))?;
    let output_root = if job.intermediate {
        env.root.join(env.config.intermediate_root())
    } else {
        env.root.join(&env.config.cache_root).join(&job.platform)
    };
    debug!(
        "Running job {} {} [{}/{}]",
        job.id, job.source_path, job.builder_id, job.platform
    );
    transform.run(&TransformContext {
        job,
        input: env.root.join(&job.input_path),
        output_root,
        with_hash: env.with_hash,
    })
}
