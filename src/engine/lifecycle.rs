//! Deletion cascades: products, synthetic sources and their jobs go away together.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info};

use crate::graph::{Claim, DependencyGraph};
use crate::types::{JobDetails, JobId, JobStatus, Product, ProductId, SourceId};

use super::conflict::ConflictResolver;
use super::incremental::{FingerprintKey, IncrementalScheduler};

/// What a cascade removed. Callers turn products into cache paths to delete.
#[derive(Debug, Default)]
pub struct Removal {
    /// Logical paths of removed sources, in removal order.
    pub sources: Vec<String>,
    pub products: Vec<Product>,
    /// Queued jobs dropped before they ran.
    pub dropped_jobs: Vec<JobId>,
    /// In-flight jobs whose source is gone; their outputs are garbage on completion.
    pub orphaned_jobs: Vec<JobId>,
    /// Sources that lost a claim this cascade released.
    pub retry: Vec<SourceId>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.products.is_empty() && self.dropped_jobs.is_empty()
    }

    pub fn merge(&mut self, other: Removal) {
        self.sources.extend(other.sources);
        self.products.extend(other.products);
        self.dropped_jobs.extend(other.dropped_jobs);
        self.orphaned_jobs.extend(other.orphaned_jobs);
        self.retry.extend(other.retry);
    }
}

/// Mutable state a cascade touches, borrowed from the pipeline for one call.
pub struct CascadeCtx<'a> {
    pub graph: &'a mut DependencyGraph,
    pub incremental: &'a mut IncrementalScheduler,
    pub conflicts: &'a mut ConflictResolver,
    pub pending: &'a mut VecDeque<JobId>,
}

#[derive(Debug, Default)]
pub struct ProductLifecycleManager {
    /// Jobs that were running when their source disappeared.
    orphans: HashMap<JobId, JobDetails>,
}

impl ProductLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_orphan(&mut self, job: JobId) -> Option<JobDetails> {
        self.orphans.remove(&job)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Remove `root` and everything downstream of it. Each source is removed exactly once.
    pub fn on_source_deleted(&mut self, ctx: &mut CascadeCtx<'_>, root: SourceId) -> Removal {
        let mut removal = Removal::default();
        self.cascade(ctx, vec![root], &mut removal);
        removal
    }

    /// Remove individual products (e.g. stale outputs), cascading into synthetic sources they fed.
    pub fn remove_products(&mut self, ctx: &mut CascadeCtx<'_>, ids: &[ProductId]) -> Removal {
        let mut removal = Removal::default();
        let mut children = Vec::new();
        for id in ids {
            if let Some(child) = remove_product(ctx, *id, &mut removal) {
                children.push(child);
            }
        }
        self.cascade(ctx, children, &mut removal);
        removal
    }

    fn cascade(&mut self, ctx: &mut CascadeCtx<'_>, mut work: Vec<SourceId>, removal: &mut Removal) {
        let mut removed: HashSet<SourceId> = HashSet::new();
        while let Some(id) = work.pop() {
            if !removed.insert(id) {
                panic!("source {id} reached twice in one deletion cascade");
            }
            let Some(source) = ctx.graph.source(id) else {
                panic!("deletion cascade reached missing source {id}");
            };
            let path = source.path.clone();
            for job_id in ctx.graph.job_ids_for_source(id) {
                let product_ids: Vec<ProductId> = ctx
                    .graph
                    .products_of_job(job_id)
                    .iter()
                    .map(|p| p.id)
                    .collect();
                for pid in product_ids {
                    if let Some(child) = remove_product(ctx, pid, removal) {
                        work.push(child);
                    }
                }
                let job = ctx.graph.remove_job(job_id);
                match job.status {
                    JobStatus::Queued => {
                        ctx.pending.retain(|j| *j != job_id);
                        removal.dropped_jobs.push(job_id);
                    }
                    JobStatus::Processing => {
                        removal.orphaned_jobs.push(job_id);
                        self.orphans.insert(job_id, job);
                    }
                    JobStatus::Completed | JobStatus::Failed => {}
                }
            }
            let own = Claim::Source(path.clone());
            if ctx.graph.release(&own, id) {
                removal.retry.extend(ctx.conflicts.take_blocked(&own));
            }
            ctx.incremental.forget_source(id);
            ctx.conflicts.forget(id);
            ctx.graph.remove_source(id);
            info!("Removed source {path}");
            removal.sources.push(path);
        }
        removal.retry.retain(|s| !removed.contains(s));
    }
}

/// Remove one product, release its claim, and return the synthetic source it fed (if still live).
fn remove_product(
    ctx: &mut CascadeCtx<'_>,
    id: ProductId,
    removal: &mut Removal,
) -> Option<SourceId> {
    let product = ctx.graph.remove_product(id);
    let claim = Claim::of(&product);
    // A newer product of the same source may hold the same path or the same key.
    let key = FingerprintKey::of(&product);
    let live = ctx.graph.products_of_source(product.source_id);
    let path_held = live.iter().any(|p| {
        p.path == product.path && p.platform == product.platform && p.flags == product.flags
    });
    let key_held = live.iter().any(|p| FingerprintKey::of(p) == key);
    if !path_held && ctx.graph.release(&claim, product.source_id) {
        removal.retry.extend(ctx.conflicts.take_blocked(&claim));
    }
    if !key_held {
        ctx.incremental.forget(&key);
    }
    debug!("Removed product {}/{}", product.platform, product.path);
    let child = product
        .intermediate_source
        .filter(|s| ctx.graph.contains_source(*s));
    removal.products.push(product);
    child
}
