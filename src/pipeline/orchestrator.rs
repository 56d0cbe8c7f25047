//! Serializing loop around the [`AssetPipeline`]: every file event, scan result and runner callback
//! arrives as a [`Command`] on one channel and is applied in arrival order on this thread.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::engine::core::{AssetPipeline, Outcome};
use crate::types::{FileEvent, Fingerprint, JobDetails, JobId, ProductOutput};

use super::queue::EventQueue;

/// How long the loop waits for a command before re-checking the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub enum Command {
    Event(FileEvent),
    ScanStarted,
    /// Workspace-relative path -> fingerprint of every file found.
    ScanFinished {
        current: BTreeMap<String, Fingerprint>,
    },
    ScanFailed {
        error: String,
    },
    JobCompleted {
        job: JobId,
        outputs: Vec<ProductOutput>,
    },
    JobFailed {
        job: JobId,
        reason: String,
    },
    Reprocess {
        path: String,
        reply: Sender<usize>,
    },
    DependentCount {
        path: String,
        reply: Sender<usize>,
    },
    /// Stop dispatching; exit once running jobs have reported.
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    /// A scan will report; events are deferred until it does.
    Waiting,
    Running,
    Done,
}

/// Result of [`Orchestrator::run`].
pub struct RunResult {
    pub pipeline: AssetPipeline,
    pub scan_error: Option<String>,
    /// Stopped by Ctrl+C or [`Command::Shutdown`] before the work ran out.
    pub cancelled: bool,
    /// Stale output files deleted from the workspace.
    pub garbage_removed: usize,
}

pub struct Orchestrator {
    pipeline: AssetPipeline,
    root: PathBuf,
    cmd_rx: Receiver<Command>,
    job_tx: Sender<JobDetails>,
    cancel: Arc<AtomicBool>,
    workers: usize,
    reprocess: Vec<String>,
    scan: ScanState,
    deferred: EventQueue,
    outstanding: HashSet<JobId>,
    scan_error: Option<String>,
    stopping: bool,
    garbage_removed: usize,
}

impl Orchestrator {
    /// `expect_scan`: hold the loop open (and buffer events) until a scan reports.
    pub fn new(
        pipeline: AssetPipeline,
        root: &Path,
        cmd_rx: Receiver<Command>,
        job_tx: Sender<JobDetails>,
        workers: usize,
        expect_scan: bool,
    ) -> Self {
        Orchestrator {
            pipeline,
            root: root.to_path_buf(),
            cmd_rx,
            job_tx,
            cancel: Arc::new(AtomicBool::new(false)),
            workers: workers.max(1),
            reprocess: Vec::new(),
            scan: if expect_scan {
                ScanState::Waiting
            } else {
                ScanState::Done
            },
            deferred: EventQueue::new(),
            outstanding: HashSet::new(),
            scan_error: None,
            stopping: false,
            garbage_removed: 0,
        }
    }

    /// Paths to force-reprocess once the scan has been applied.
    pub fn with_reprocess(mut self, paths: Vec<String>) -> Self {
        self.reprocess = paths;
        self
    }

    /// Flag that stops dispatch when set (wired to Ctrl+C by the CLI).
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run until the scan is applied, no job is queued and every dispatched job has reported.
    pub fn run(mut self) -> RunResult {
        loop {
            if self.cancel.load(Ordering::Relaxed) && !self.stopping {
                warn!("Interrupted; waiting for {} running jobs", self.outstanding.len());
                self.stopping = true;
            }
            self.dispatch();
            if self.finished() {
                break;
            }
            match self.cmd_rx.recv_timeout(POLL_INTERVAL) {
                Ok(cmd) => self.apply(cmd),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed");
                    break;
                }
            }
        }
        RunResult {
            cancelled: self.stopping,
            pipeline: self.pipeline,
            scan_error: self.scan_error,
            garbage_removed: self.garbage_removed,
        }
    }

    fn finished(&self) -> bool {
        if !self.outstanding.is_empty() {
            return false;
        }
        self.stopping || (self.scan == ScanState::Done && self.pipeline.pending_count() == 0)
    }

    fn dispatch(&mut self) {
        while !self.stopping && self.outstanding.len() < self.workers {
            let Some(job) = self.pipeline.take_next_job() else {
                break;
            };
            let id = job.id;
            if self.job_tx.send(job).is_err() {
                error!("No runner accepts jobs; stopping");
                if let Err(e) = self.pipeline.on_job_failed(id, "runner unavailable") {
                    debug!("{e}");
                }
                self.stopping = true;
                break;
            }
            self.outstanding.insert(id);
        }
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Event(event) => {
                if self.scan == ScanState::Done {
                    let outcome = self.pipeline.handle_event(event);
                    self.collect(outcome);
                } else {
                    self.deferred.push(event);
                }
            }
            Command::ScanStarted => {
                debug!("Scan started");
                self.scan = ScanState::Running;
            }
            Command::ScanFinished { current } => self.apply_scan(current),
            Command::ScanFailed { error } => {
                error!("Scan failed: {error}");
                self.scan_error = Some(error);
                self.scan = ScanState::Done;
                self.stopping = true;
            }
            Command::JobCompleted { job, outputs } => {
                self.outstanding.remove(&job);
                match self.pipeline.on_job_completed(job, outputs) {
                    Ok(completion) => {
                        if let Some(reason) = &completion.reason {
                            debug!("Outputs of job {job} discarded: {reason}");
                        }
                        self.collect(completion.outcome);
                    }
                    Err(e) => warn!("{e}"),
                }
            }
            Command::JobFailed { job, reason } => {
                self.outstanding.remove(&job);
                if let Err(e) = self.pipeline.on_job_failed(job, &reason) {
                    warn!("{e}");
                }
            }
            Command::Reprocess { path, reply } => {
                let n = self.pipeline.request_reprocess(&path);
                let _ = reply.send(n);
            }
            Command::DependentCount { path, reply } => {
                let _ = reply.send(self.pipeline.dependent_count(&path));
            }
            Command::Shutdown => {
                info!("Shutdown requested");
                self.stopping = true;
            }
        }
    }

    /// Reconcile the restored graph with the scan, then replay deferred events and reprocess requests.
    fn apply_scan(&mut self, current: BTreeMap<String, Fingerprint>) {
        let events = self.pipeline.reconcile(&current);
        info!(
            "Scan found {} files; {} changes since the last checkpoint",
            current.len(),
            events.len()
        );
        for event in events {
            let outcome = self.pipeline.handle_event(event);
            self.collect(outcome);
        }
        self.scan = ScanState::Done;
        let deferred = self.deferred.drain();
        if !deferred.is_empty() {
            debug!("Replaying {} events received during the scan", deferred.len());
        }
        for event in deferred {
            let outcome = self.pipeline.handle_event(event);
            self.collect(outcome);
        }
        for path in std::mem::take(&mut self.reprocess) {
            let n = self.pipeline.request_reprocess(&path);
            info!("Reprocess {path}: {n} sources queued");
        }
    }

    /// Delete files that no longer belong to a live product.
    fn collect(&mut self, outcome: Outcome) {
        for rel in outcome.garbage {
            let path = self.root.join(&rel);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {rel}");
                    self.garbage_removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {e}", path.display()),
            }
        }
    }
}
