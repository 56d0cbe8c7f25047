//! The asset pipeline: single-writer core tying classification, job generation, chain validation
//! and incremental commit together.
//!
//! Every method takes `&mut self`; the orchestrator owns the pipeline on one thread and funnels
//! file events and runner callbacks through it in arrival order.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{ConflictError, PipelineError};
use crate::graph::{Claim, ClaimOwner, DependencyGraph};
use crate::registry::BuilderRegistry;
use crate::types::{
    COMMON_PLATFORM, FileEvent, Fingerprint, JobDetails, JobId, JobKey, JobStatus,
    PipelineConfig, Product, ProductId, ProductOutput, SourceFile, SourceId, SourceState,
};

use super::classifier::{Classification, SourceFileClassifier};
use super::conflict::ConflictResolver;
use super::cycle::CycleDetector;
use super::incremental::IncrementalScheduler;
use super::jobs::{IdAllocator, JobGenerator};
use super::lifecycle::{CascadeCtx, ProductLifecycleManager, Removal};
use super::tools::{is_under_folder, normalize_rel};

/// Delivered synchronously to the listener, on the thread that owns the pipeline.
#[derive(Clone, Debug)]
pub enum Notification {
    JobQueued(JobDetails),
    JobFailed(JobDetails),
    JobCompleted(JobDetails),
    SourceRemoved { path: String },
    ProductRemoved { path: String },
    /// An authored file could not enter the graph because its path is held by an intermediate output.
    SourceRejected { path: String, reason: String },
}

pub type Listener = Box<dyn FnMut(&Notification) + Send>;

/// Effects of one event or callback.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Jobs created (queued and autoFail).
    pub jobs: Vec<JobId>,
    pub removal: Removal,
    /// Workspace-relative files that no longer belong to any live product.
    pub garbage: Vec<String>,
}

impl Outcome {
    pub fn merge(&mut self, other: Outcome) {
        self.jobs.extend(other.jobs);
        self.removal.merge(other.removal);
        self.garbage.extend(other.garbage);
    }
}

/// Result of [`AssetPipeline::on_job_completed`].
#[derive(Debug, Default)]
pub struct Completion {
    /// Outputs were committed to the graph.
    pub accepted: bool,
    /// Why outputs were rejected (cycle, conflict, superseded, orphaned).
    pub reason: Option<String>,
    pub outcome: Outcome,
}

pub struct AssetPipeline {
    registry: Arc<BuilderRegistry>,
    config: PipelineConfig,
    graph: DependencyGraph,
    incremental: IncrementalScheduler,
    conflicts: ConflictResolver,
    lifecycle: ProductLifecycleManager,
    pending: VecDeque<JobId>,
    ids: IdAllocator,
    pass: u64,
    listener: Option<Listener>,
}

impl AssetPipeline {
    pub fn new(registry: Arc<BuilderRegistry>, config: PipelineConfig) -> Self {
        Self::from_parts(
            registry,
            config,
            DependencyGraph::new(),
            IncrementalScheduler::new(),
            IdAllocator::default(),
            0,
        )
    }

    pub(crate) fn from_parts(
        registry: Arc<BuilderRegistry>,
        config: PipelineConfig,
        graph: DependencyGraph,
        incremental: IncrementalScheduler,
        ids: IdAllocator,
        pass: u64,
    ) -> Self {
        AssetPipeline {
            registry,
            config,
            graph,
            incremental,
            conflicts: ConflictResolver::new(),
            lifecycle: ProductLifecycleManager::new(),
            pending: VecDeque::new(),
            ids,
            pass,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: Listener) {
        self.listener = Some(listener);
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub(crate) fn incremental(&self) -> &IncrementalScheduler {
        &self.incremental
    }

    pub(crate) fn ids(&self) -> IdAllocator {
        self.ids
    }

    pub(crate) fn pass(&self) -> u64 {
        self.pass
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&notification);
        }
    }

    // ---- file events ----

    pub fn handle_event(&mut self, event: FileEvent) -> Outcome {
        match event {
            FileEvent::Added { path, fingerprint } => self.on_file_added(&path, fingerprint),
            FileEvent::Modified { path, fingerprint } => self.on_file_modified(&path, fingerprint),
            FileEvent::Deleted { path } => self.on_file_deleted(&path),
            FileEvent::FolderDeleted { path } => self.on_folder_deleted(&path),
        }
    }

    pub fn on_file_added(&mut self, path: &str, fingerprint: Fingerprint) -> Outcome {
        self.settled(|p, outcome| p.file_changed(path, fingerprint, outcome))
    }

    pub fn on_file_modified(&mut self, path: &str, fingerprint: Fingerprint) -> Outcome {
        self.settled(|p, outcome| p.file_changed(path, fingerprint, outcome))
    }

    pub fn on_file_deleted(&mut self, path: &str) -> Outcome {
        self.settled(|p, outcome| p.file_deleted(path, outcome))
    }

    /// Remove every source under `folder`, in sorted path order.
    ///
    /// A folder in the intermediate tree selects synthetic sources by logical path; a folder in a
    /// platform product tree re-queues the owners of the products below it.
    pub fn on_folder_deleted(&mut self, folder: &str) -> Outcome {
        self.settled(|p, outcome| p.folder_deleted(folder, outcome))
    }

    /// Run one entry point, then settle its removals exactly once.
    fn settled(&mut self, f: impl FnOnce(&mut Self, &mut Outcome)) -> Outcome {
        let mut outcome = Outcome::default();
        f(self, &mut outcome);
        self.settle(&mut outcome);
        outcome
    }

    fn file_changed(&mut self, path: &str, fingerprint: Fingerprint, outcome: &mut Outcome) {
        let path = normalize_rel(path);
        let classifier = SourceFileClassifier::new(&self.config, &self.graph);
        let class = classifier.classify(&path);
        let in_intermediate_tree = classifier.is_intermediate_location(&path);
        match class {
            Classification::Product { platform, path } => {
                debug!("Ignoring product file {platform}/{path}");
            }
            Classification::Synthetic(rel) if in_intermediate_tree => {
                self.synthetic_changed(rel, fingerprint, outcome);
            }
            Classification::Synthetic(rel) | Classification::Authored(rel) => {
                self.authored_changed(rel, fingerprint, outcome);
            }
        }
    }

    fn authored_changed(&mut self, rel: String, fingerprint: Fingerprint, outcome: &mut Outcome) {
        if let Some(source) = self.graph.source_by_path(&rel)
            && source.produced_by.is_none()
        {
            let id = source.id;
            let forced = source.dirty;
            if source.fingerprint == fingerprint && !forced && source.state != SourceState::Unprocessed
            {
                debug!("{rel} unchanged");
                return;
            }
            if let Some(s) = self.graph.source_mut(id) {
                s.fingerprint = fingerprint;
            }
            outcome.jobs.extend(self.generate(id, forced));
            return;
        }

        let claim = Claim::Source(rel.clone());
        if let Some(owner) = self.graph.claim_owner(&claim)
            && let Some(occupant) = self.graph.source(owner.source)
        {
            let reason = ConflictError::PathClaimed {
                path: rel.clone(),
                occupant: occupant.path.clone(),
                occupant_id: occupant.id,
            }
            .to_string();
            warn!("{rel}: {reason}");
            self.conflicts.shadow(rel.clone(), fingerprint);
            self.notify(Notification::SourceRejected { path: rel, reason });
            return;
        }

        let id = SourceId::new();
        self.graph.insert_source(SourceFile {
            id,
            path: rel.clone(),
            fingerprint,
            produced_by: None,
            produced_by_product: None,
            state: SourceState::Unprocessed,
            dirty: false,
            pass: 0,
        });
        self.graph.claim(
            claim,
            ClaimOwner {
                source: id,
                builder: None,
            },
        );
        info!("Added source {rel}");
        outcome.jobs.extend(self.generate(id, false));
    }

    /// An intermediate file appeared or changed. Links it to the product that emitted it.
    fn synthetic_changed(&mut self, rel: String, fingerprint: Fingerprint, outcome: &mut Outcome) {
        let Some(ClaimOwner {
            source: parent,
            builder: Some(builder),
        }) = self.graph.claim_owner(&Claim::Source(rel.clone())).cloned()
        else {
            warn!("Intermediate file {rel} has no producing job; ignoring");
            return;
        };
        let key = JobKey {
            source_id: parent,
            builder_id: builder,
            platform: COMMON_PLATFORM.to_string(),
        };
        let Some(job_id) = self.graph.latest_job(&key).map(|j| j.id) else {
            warn!("Intermediate file {rel} has no committed producer; ignoring");
            return;
        };
        let Some(product_id) = self
            .graph
            .products_of_job(job_id)
            .into_iter()
            .find(|p| p.path == rel)
            .map(|p| p.id)
        else {
            warn!("Intermediate file {rel} is not among the outputs of job {job_id}; ignoring");
            return;
        };

        if let Some(id) = self.graph.source_by_path(&rel).map(|s| s.id) {
            let Some(source) = self.graph.source_mut(id) else {
                return;
            };
            let changed = source.fingerprint != fingerprint;
            let forced = source.dirty;
            let unprocessed = source.state == SourceState::Unprocessed;
            source.fingerprint = fingerprint;
            source.produced_by = Some(job_id);
            source.produced_by_product = Some(product_id);
            if let Some(p) = self.graph.product_mut(product_id) {
                p.intermediate_source = Some(id);
            }
            if changed || forced || unprocessed {
                outcome.jobs.extend(self.generate(id, forced));
            } else {
                debug!("{rel} unchanged");
            }
            return;
        }

        let id = SourceId::new();
        self.graph.insert_source(SourceFile {
            id,
            path: rel.clone(),
            fingerprint,
            produced_by: Some(job_id),
            produced_by_product: Some(product_id),
            state: SourceState::Unprocessed,
            dirty: false,
            pass: 0,
        });
        if let Some(p) = self.graph.product_mut(product_id) {
            p.intermediate_source = Some(id);
        }
        info!("Added intermediate source {rel}");
        outcome.jobs.extend(self.generate(id, false));
    }

    fn file_deleted(&mut self, path: &str, outcome: &mut Outcome) {
        let path = normalize_rel(path);
        let classifier = SourceFileClassifier::new(&self.config, &self.graph);
        let class = classifier.classify(&path);
        let in_intermediate_tree = classifier.is_intermediate_location(&path);
        match class {
            Classification::Product { platform, path } => {
                self.product_file_deleted(platform, path, outcome);
            }
            Classification::Synthetic(rel) if in_intermediate_tree => {
                if let Some(id) = self.graph.source_by_path(&rel).map(|s| s.id) {
                    self.delete_synthetic(id, outcome);
                }
            }
            Classification::Synthetic(rel) | Classification::Authored(rel) => {
                match self.graph.source_by_path(&rel) {
                    Some(s) if s.produced_by.is_none() => {
                        let id = s.id;
                        outcome.removal.merge(self.delete_source(id));
                    }
                    _ => {
                        if self.conflicts.unshadow(&rel).is_some() {
                            debug!("Shadowed file {rel} deleted");
                        }
                    }
                }
            }
        }
    }

    fn folder_deleted(&mut self, folder: &str, outcome: &mut Outcome) {
        let folder = normalize_rel(folder);
        let classifier = SourceFileClassifier::new(&self.config, &self.graph);
        let class = classifier.classify(&folder);
        let in_intermediate_tree = classifier.is_intermediate_location(&folder);

        if let Classification::Product { platform, path } = &class {
            let owners: BTreeSet<SourceId> = self
                .graph
                .products()
                .filter(|p| !p.is_intermediate())
                .filter(|p| &p.platform == platform && is_under_folder(&p.path, path))
                .map(|p| p.source_id)
                .collect();
            for id in owners {
                outcome.jobs.extend(self.generate(id, true));
            }
            return;
        }

        let logical = class.logical();
        let mut matched: Vec<(String, SourceId, bool)> = self
            .graph
            .sources()
            .filter(|s| is_under_folder(&s.path, &logical))
            .filter(|s| s.produced_by.is_some() == in_intermediate_tree)
            .map(|s| (s.path.clone(), s.id, s.produced_by.is_some()))
            .collect();
        matched.sort();
        info!("Folder {folder} deleted: {} sources below it", matched.len());
        for (_, id, synthetic) in matched {
            if !self.graph.contains_source(id) {
                continue;
            }
            if synthetic {
                self.delete_synthetic(id, outcome);
            } else {
                outcome.removal.merge(self.delete_source(id));
            }
        }
        if !in_intermediate_tree {
            self.conflicts.unshadow_under(&logical);
        }
    }

    /// The intermediate file of a synthetic source vanished: drop its subtree, detach it from the
    /// producing product and re-run the producer so the file comes back.
    fn delete_synthetic(&mut self, id: SourceId, outcome: &mut Outcome) {
        let Some(source) = self.graph.source(id) else {
            return;
        };
        let product = source.produced_by_product;
        let parent = self.graph.parent_of(id);
        if let Some(pid) = product
            && let Some(p) = self.graph.product_mut(pid)
        {
            p.intermediate_source = None;
        }
        outcome.removal.merge(self.delete_source(id));
        if let Some(parent) = parent
            && self.graph.contains_source(parent)
        {
            info!("Regenerating intermediate outputs of {}", self.source_path(parent));
            outcome.jobs.extend(self.generate(parent, true));
        }
    }

    fn product_file_deleted(&mut self, platform: String, path: String, outcome: &mut Outcome) {
        let claim = Claim::Product { platform, path };
        let Some(owner) = self.graph.claim_owner(&claim).map(|o| o.source) else {
            return;
        };
        if self.graph.contains_source(owner) {
            info!("Product {} deleted; re-queueing {}", claim.describe(), self.source_path(owner));
            outcome.jobs.extend(self.generate(owner, true));
        }
    }

    fn delete_source(&mut self, id: SourceId) -> Removal {
        let mut ctx = CascadeCtx {
            graph: &mut self.graph,
            incremental: &mut self.incremental,
            conflicts: &mut self.conflicts,
            pending: &mut self.pending,
        };
        self.lifecycle.on_source_deleted(&mut ctx, id)
    }

    fn remove_products(&mut self, ids: &[ProductId]) -> Removal {
        let mut ctx = CascadeCtx {
            graph: &mut self.graph,
            incremental: &mut self.incremental,
            conflicts: &mut self.conflicts,
            pending: &mut self.pending,
        };
        self.lifecycle.remove_products(&mut ctx, ids)
    }

    /// Turn a removal into notifications and garbage, then retry blocked and shadowed sources.
    fn settle(&mut self, outcome: &mut Outcome) {
        let mut retry = std::mem::take(&mut outcome.removal.retry);
        let mut cursor_sources = 0;
        let mut cursor_products = 0;
        loop {
            let sources: Vec<String> = outcome.removal.sources[cursor_sources..].to_vec();
            let products: Vec<Product> = outcome.removal.products[cursor_products..].to_vec();
            cursor_sources = outcome.removal.sources.len();
            cursor_products = outcome.removal.products.len();
            for path in sources {
                self.notify(Notification::SourceRemoved { path });
            }
            for product in products {
                let file = self.product_file(&product);
                outcome.garbage.push(file.clone());
                self.notify(Notification::ProductRemoved { path: file });
            }

            retry.retain(|id| self.graph.contains_source(*id));
            retry.sort();
            retry.dedup();
            for id in std::mem::take(&mut retry) {
                info!("Retrying {} after its output path was released", self.source_path(id));
                outcome.jobs.extend(self.generate(id, true));
            }
            let freed = self.conflicts.take_unshadowed(&self.graph);
            if freed.is_empty() {
                break;
            }
            for (path, fingerprint) in freed {
                let mut inner = Outcome::default();
                self.authored_changed(path, fingerprint, &mut inner);
                outcome.merge(inner);
            }
            retry = std::mem::take(&mut outcome.removal.retry);
        }
    }

    /// Workspace-relative file of a product.
    pub fn product_file(&self, product: &Product) -> String {
        if product.is_intermediate() {
            self.config.intermediate_path(&product.path)
        } else {
            self.config.product_path(&product.platform, &product.path)
        }
    }

    fn source_path(&self, id: SourceId) -> String {
        self.graph
            .source(id)
            .map(|s| s.path.clone())
            .unwrap_or_else(|| id.to_string())
    }

    // ---- job generation ----

    /// Start a new generation pass for `id`. Queued jobs of earlier passes are dropped; running
    /// ones become stale and their completions are discarded.
    fn generate(&mut self, id: SourceId, forced: bool) -> Vec<JobId> {
        if !self.graph.contains_source(id) {
            return Vec::new();
        }
        self.pass += 1;
        let pass = self.pass;
        let queued: Vec<JobId> = self
            .graph
            .jobs_for_source(id)
            .into_iter()
            .filter(|j| j.status == JobStatus::Queued)
            .map(|j| j.id)
            .collect();
        for job in queued {
            self.pending.retain(|j| *j != job);
            self.graph.remove_job(job);
        }
        self.graph.prune_jobs(id, pass);

        let Some(source) = self.graph.source_mut(id) else {
            return Vec::new();
        };
        source.pass = pass;
        let source = source.clone();
        let jobs = JobGenerator::new(&self.registry, &self.config).generate(
            &self.graph,
            &source,
            pass,
            forced,
            &mut self.ids,
        );
        let mut created = Vec::with_capacity(jobs.len());
        for job in jobs {
            created.push(job.id);
            self.graph.insert_job(job.clone());
            if job.auto_fail {
                warn!(
                    "{} [{}]: {}",
                    job.source_path,
                    job.builder_id,
                    job.fail_reason.as_deref().unwrap_or("")
                );
                self.notify(Notification::JobFailed(job));
            } else {
                debug!(
                    "Queued job {} {} [{}/{}]",
                    job.id, job.source_path, job.builder_id, job.platform
                );
                self.pending.push_back(job.id);
                self.notify(Notification::JobQueued(job));
            }
        }
        self.refresh_state(id);
        created
    }

    /// Derive a source's state from the jobs of its latest pass.
    fn refresh_state(&mut self, id: SourceId) {
        let Some(pass) = self.graph.source(id).map(|s| s.pass) else {
            return;
        };
        let statuses: Vec<JobStatus> = self
            .graph
            .jobs_for_source(id)
            .into_iter()
            .filter(|j| j.pass == pass)
            .map(|j| j.status)
            .collect();
        let state = if statuses.contains(&JobStatus::Processing) {
            SourceState::Processing
        } else if statuses.contains(&JobStatus::Queued) {
            SourceState::Queued
        } else if statuses.contains(&JobStatus::Failed) {
            SourceState::Failed
        } else {
            SourceState::Completed
        };
        if let Some(s) = self.graph.source_mut(id) {
            s.state = state;
            if matches!(state, SourceState::Completed | SourceState::Failed) {
                s.dirty = false;
            }
        }
    }

    // ---- job protocol ----

    /// Dispatch the next queued job, marking it Processing.
    pub fn take_next_job(&mut self) -> Option<JobDetails> {
        while let Some(id) = self.pending.pop_front() {
            let Some(job) = self.graph.job_mut(id) else {
                continue;
            };
            if job.status != JobStatus::Queued {
                continue;
            }
            job.status = JobStatus::Processing;
            let job = job.clone();
            self.refresh_state(job.source_id);
            return Some(job);
        }
        None
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.graph
            .jobs()
            .filter(|j| j.status == JobStatus::Processing)
            .count()
            + self.lifecycle.orphan_count()
    }

    /// No queued and no running jobs.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight_count() == 0
    }

    /// Commit a finished job's outputs, or reject them as a cycle or conflict.
    pub fn on_job_completed(
        &mut self,
        job_id: JobId,
        outputs: Vec<ProductOutput>,
    ) -> Result<Completion, PipelineError> {
        if let Some(orphan) = self.lifecycle.take_orphan(job_id) {
            info!("Job {job_id} finished after {} was deleted", orphan.source_path);
            let garbage = outputs.iter().map(|o| self.output_file(&orphan, o)).collect();
            return Ok(Completion {
                accepted: false,
                reason: Some(format!("source '{}' was deleted", orphan.source_path)),
                outcome: Outcome {
                    garbage,
                    ..Outcome::default()
                },
            });
        }
        let job = self
            .graph
            .job(job_id)
            .cloned()
            .ok_or(PipelineError::UnknownJob(job_id))?;
        if job.status == JobStatus::Failed && job.auto_fail {
            // Failed by a cycle elsewhere in its pass while it was running.
            let garbage = self.unowned_outputs(&job, &outputs);
            return Ok(Completion {
                accepted: false,
                reason: job.fail_reason.clone(),
                outcome: Outcome {
                    garbage,
                    ..Outcome::default()
                },
            });
        }
        if job.status != JobStatus::Processing {
            return Err(PipelineError::NotDispatched(job_id));
        }
        // Deleting a source drops or orphans its jobs, so a live job always has its source.
        let Some(source) = self.graph.source(job.source_id) else {
            panic!("job {job_id} outlived source {}", job.source_id);
        };
        if job.pass != source.pass {
            debug!("Discarding stale completion of job {job_id} ({})", job.source_path);
            let garbage = self.unowned_outputs(&job, &outputs);
            self.graph.remove_job(job_id);
            return Ok(Completion {
                accepted: false,
                reason: Some("superseded by a newer pass".to_string()),
                outcome: Outcome {
                    garbage,
                    ..Outcome::default()
                },
            });
        }

        let taken_over = self.preemptible_claims(&job, &outputs);
        if let Err(rejection) = self.validate(&job, &outputs, &taken_over) {
            return Ok(self.reject(&job, &outputs, rejection));
        }
        let mut outcome = Outcome::default();
        for claim in &taken_over {
            self.preempt(claim, &job, &mut outcome);
        }

        let commit = self
            .incremental
            .commit(&mut self.graph, &job, &outputs, &mut self.ids);
        info!(
            "Job {job_id} {} [{}/{}] completed with {} products",
            job.source_path,
            job.builder_id,
            job.platform,
            commit.committed.len()
        );
        if let Some(done) = self.graph.job(job_id).cloned() {
            self.notify(Notification::JobCompleted(done));
        }
        if !commit.stale.is_empty() {
            outcome.removal.merge(self.remove_products(&commit.stale));
        }
        self.refresh_state(job.source_id);
        for (path, fingerprint) in commit.synthesize {
            let path = self.config.intermediate_path(&path);
            self.file_changed(&path, fingerprint, &mut outcome);
        }
        if !taken_over.is_empty() {
            // The losing run may have written the shared files after this one did.
            info!("Rebuilding {} after taking over its outputs", job.source_path);
            outcome.jobs.extend(self.generate(job.source_id, true));
        }
        self.settle(&mut outcome);
        if !taken_over.is_empty() {
            let own: Vec<String> = outputs.iter().map(|o| self.output_file(&job, o)).collect();
            outcome.garbage.retain(|f| !own.contains(f));
        }
        Ok(Completion {
            accepted: true,
            reason: None,
            outcome,
        })
    }

    pub fn on_job_failed(&mut self, job_id: JobId, reason: &str) -> Result<(), PipelineError> {
        if let Some(orphan) = self.lifecycle.take_orphan(job_id) {
            debug!("Orphaned job {job_id} ({}) failed: {reason}", orphan.source_path);
            return Ok(());
        }
        let job = self
            .graph
            .job_mut(job_id)
            .ok_or(PipelineError::UnknownJob(job_id))?;
        match job.status {
            JobStatus::Processing | JobStatus::Queued => {}
            JobStatus::Failed if job.auto_fail => return Ok(()),
            _ => return Err(PipelineError::NotDispatched(job_id)),
        }
        job.status = JobStatus::Failed;
        job.fail_reason = Some(reason.to_string());
        let job = job.clone();
        self.pending.retain(|j| *j != job_id);
        warn!(
            "Job {job_id} {} [{}/{}] failed: {reason}",
            job.source_path, job.builder_id, job.platform
        );
        self.refresh_state(job.source_id);
        self.notify(Notification::JobFailed(job));
        Ok(())
    }

    /// Claims held by another source that a job queued after `job` took first.
    ///
    /// Claims go to the lower job id among jobs that were outstanding together, so the winner of a
    /// same-batch collision follows queue order, not which worker finished first.
    fn preemptible_claims(&self, job: &JobDetails, outputs: &[ProductOutput]) -> Vec<Claim> {
        let mut claims: Vec<Claim> = outputs
            .iter()
            .map(|o| self.claim_for(job, &o.path))
            .filter(|claim| {
                self.graph
                    .claim_owner(claim)
                    .is_some_and(|o| o.source != job.source_id && o.builder.is_some())
                    && self.graph.acquired_by(claim).is_some_and(|taken| taken > job.id)
            })
            .collect();
        claims.sort();
        claims.dedup();
        claims
    }

    /// Undo the run holding `claim` so `winner` can commit. The loser waits for the claim.
    fn preempt(&mut self, claim: &Claim, winner: &JobDetails, outcome: &mut Outcome) {
        let Some(owner) = self.graph.claim_owner(claim).cloned() else {
            return;
        };
        let Some(loser) = self
            .graph
            .products()
            .find(|p| {
                p.source_id == owner.source
                    && owner.builder.as_deref() == Some(p.builder_id.as_str())
                    && Claim::of(p) == *claim
            })
            .and_then(|p| self.graph.job(p.job_id))
            .cloned()
        else {
            return;
        };
        let reason = ConflictError::PathClaimed {
            path: claim.describe(),
            occupant: winner.source_path.clone(),
            occupant_id: winner.source_id,
        }
        .to_string();
        warn!(
            "{} [{}]: {reason} (job {} was queued first)",
            loser.source_path, loser.builder_id, winner.id
        );
        let products: Vec<ProductId> = self
            .graph
            .products_of_job(loser.id)
            .iter()
            .map(|p| p.id)
            .collect();
        outcome.removal.merge(self.remove_products(&products));
        self.graph.forget_latest(&loser.key(), loser.id);
        self.fail_with_entry(&loser, &reason, outcome);
        self.conflicts.block(claim.clone(), loser.source_id);
        self.refresh_state(loser.source_id);
    }

    /// Cycle check first, then the within-job sub id check, then claims not in `taken_over`.
    fn validate(
        &self,
        job: &JobDetails,
        outputs: &[ProductOutput],
        taken_over: &[Claim],
    ) -> Result<(), Rejection> {
        if job.intermediate {
            for out in outputs {
                CycleDetector::check_chain(&self.graph, &out.path, job.source_id)
                    .map_err(|e| Rejection::Cycle(e.to_string()))?;
            }
        }
        ConflictResolver::check_sub_ids(outputs).map_err(|e| Rejection::Conflict(e, None))?;
        let owner = ClaimOwner {
            source: job.source_id,
            builder: Some(job.builder_id.clone()),
        };
        for out in outputs {
            let claim = self.claim_for(job, &out.path);
            if taken_over.contains(&claim) {
                continue;
            }
            ConflictResolver::check_collision(&self.graph, &claim, &owner)
                .map_err(|e| Rejection::Conflict(e, Some(claim)))?;
        }
        Ok(())
    }

    /// Fail the job, record autoFail entries, and keep the graph untouched.
    fn reject(
        &mut self,
        job: &JobDetails,
        outputs: &[ProductOutput],
        rejection: Rejection,
    ) -> Completion {
        let mut outcome = Outcome::default();
        let reason = match &rejection {
            Rejection::Cycle(reason) => reason.clone(),
            Rejection::Conflict(err, _) => err.to_string(),
        };
        warn!("{} [{}]: {reason}", job.source_path, job.builder_id);
        self.fail_with_entry(job, &reason, &mut outcome);

        match rejection {
            Rejection::Cycle(_) => {
                let siblings: Vec<JobDetails> = self
                    .graph
                    .jobs_for_source(job.source_id)
                    .into_iter()
                    .filter(|j| j.pass == job.pass && j.id != job.id && !j.status.is_terminal())
                    .cloned()
                    .collect();
                for sibling in siblings {
                    self.pending.retain(|j| *j != sibling.id);
                    if let Some(j) = self.graph.job_mut(sibling.id) {
                        j.status = JobStatus::Failed;
                        j.auto_fail = true;
                        j.fail_reason = Some(reason.clone());
                    }
                    if let Some(j) = self.graph.job(sibling.id).cloned() {
                        self.notify(Notification::JobFailed(j));
                    }
                }
                if let Some(upstream) = self
                    .graph
                    .source(job.source_id)
                    .and_then(|s| s.produced_by)
                    .and_then(|id| self.graph.job(id))
                    .cloned()
                {
                    let entry = self.auto_fail_entry(&upstream, &reason);
                    outcome.jobs.push(entry);
                    self.refresh_state(upstream.source_id);
                }
                outcome.garbage = outputs.iter().map(|o| self.output_file(job, o)).collect();
            }
            Rejection::Conflict(ConflictError::PathClaimed { .. }, Some(claim)) => {
                // Both chains write the same physical file unless the occupant is an authored
                // source (which lives outside the cache).
                let holder = self.graph.claim_owner(&claim).map(|o| o.source);
                let overwritten = match &claim {
                    Claim::Product { .. } => holder,
                    Claim::Source(path) => self
                        .graph
                        .source_by_path(path)
                        .filter(|s| s.produced_by.is_some())
                        .and(holder),
                };
                self.conflicts.block(claim.clone(), job.source_id);
                outcome.garbage = outputs
                    .iter()
                    .filter(|o| overwritten.is_none() || self.claim_for(job, &o.path) != claim)
                    .map(|o| self.output_file(job, o))
                    .collect();
                if let Some(holder) = overwritten
                    && self.graph.contains_source(holder)
                {
                    info!("Rebuilding {} after its output was overwritten", self.source_path(holder));
                    outcome.jobs.extend(self.generate(holder, true));
                }
            }
            Rejection::Conflict(..) => {
                outcome.garbage = self.unowned_outputs(job, outputs);
            }
        }
        self.refresh_state(job.source_id);
        Completion {
            accepted: false,
            reason: Some(reason),
            outcome,
        }
    }

    fn fail_with_entry(&mut self, job: &JobDetails, reason: &str, outcome: &mut Outcome) {
        if let Some(j) = self.graph.job_mut(job.id) {
            j.status = JobStatus::Failed;
            j.fail_reason = Some(reason.to_string());
        }
        if let Some(j) = self.graph.job(job.id).cloned() {
            self.notify(Notification::JobFailed(j));
        }
        let entry = self.auto_fail_entry(job, reason);
        outcome.jobs.push(entry);
    }

    /// Add a failed job-log entry that mirrors `template`.
    fn auto_fail_entry(&mut self, template: &JobDetails, reason: &str) -> JobId {
        let entry = JobDetails {
            id: self.ids.job(),
            auto_fail: true,
            fail_reason: Some(reason.to_string()),
            status: JobStatus::Failed,
            forced: false,
            ..template.clone()
        };
        let id = entry.id;
        self.graph.insert_job(entry.clone());
        self.notify(Notification::JobFailed(entry));
        id
    }

    fn claim_for(&self, job: &JobDetails, path: &str) -> Claim {
        if job.intermediate {
            Claim::Source(path.to_string())
        } else {
            Claim::Product {
                platform: job.platform.clone(),
                path: path.to_string(),
            }
        }
    }

    fn output_file(&self, job: &JobDetails, out: &ProductOutput) -> String {
        if job.intermediate {
            self.config.intermediate_path(&out.path)
        } else {
            self.config.product_path(&job.platform, &out.path)
        }
    }

    /// Output files of a rejected run that no live product of the same source and builder owns.
    fn unowned_outputs(&self, job: &JobDetails, outputs: &[ProductOutput]) -> Vec<String> {
        outputs
            .iter()
            .filter(|o| {
                let claim = self.claim_for(job, &o.path);
                self.graph.claim_owner(&claim).is_none_or(|owner| {
                    owner.source != job.source_id
                        || owner.builder.as_deref() != Some(job.builder_id.as_str())
                })
            })
            .map(|o| self.output_file(job, o))
            .collect()
    }

    // ---- queries ----

    /// Resolve a workspace-relative or logical path to a source.
    pub fn source_by_path(&self, path: &str) -> Option<&SourceFile> {
        let classifier = SourceFileClassifier::new(&self.config, &self.graph);
        match classifier.classify(path) {
            Classification::Authored(rel) | Classification::Synthetic(rel) => {
                self.graph.source_by_path(&rel)
            }
            Classification::Product { platform, path } => {
                let owner = self.graph.claim_owner(&Claim::Product { platform, path })?;
                self.graph.source(owner.source)
            }
        }
    }

    /// Force the whole chain containing `path` to rebuild. Returns how many sources were queued.
    pub fn request_reprocess(&mut self, path: &str) -> usize {
        let Some(id) = self.source_by_path(path).map(|s| s.id) else {
            warn!("Reprocess requested for unknown path {path}");
            return 0;
        };
        let chain = IncrementalScheduler::reprocess_set(&self.graph, id);
        for s in &chain {
            if let Some(source) = self.graph.source_mut(*s) {
                source.dirty = true;
            }
        }
        info!("Reprocessing {} sources in the chain of {path}", chain.len());
        for s in &chain {
            self.generate(*s, true);
        }
        chain.len()
    }

    /// Number of sources downstream of `path` (0 for unknown paths).
    pub fn dependent_count(&self, path: &str) -> usize {
        self.source_by_path(path)
            .map(|s| IncrementalScheduler::dependent_count(&self.graph, s.id))
            .unwrap_or(0)
    }

    /// Job-log entries of the source at `path`, in creation order.
    pub fn jobs_for_path(&self, path: &str) -> Vec<&JobDetails> {
        self.source_by_path(path)
            .map(|s| self.graph.jobs_for_source(s.id))
            .unwrap_or_default()
    }

    /// Committed products of the source at `path`.
    pub fn products_for_path(&self, path: &str) -> Vec<&Product> {
        self.source_by_path(path)
            .map(|s| self.graph.products_of_source(s.id))
            .unwrap_or_default()
    }

    /// Every job record, in id order.
    pub fn job_log(&self) -> Vec<&JobDetails> {
        self.graph.jobs().collect()
    }
}

enum Rejection {
    Cycle(String),
    /// The conflict and, for claim collisions, the contested claim.
    Conflict(ConflictError, Option<Claim>),
}
