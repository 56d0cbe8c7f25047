//! Dependency graph: arena of sources, jobs and products keyed by stable ids.
//!
//! Relations are id lists, never references, so cascading operations are worklist traversals
//! (see [`walk`]). The reverse index maps every claimed output path to the source that owns it.
//!
//! The graph is single-writer: every mutation goes through `&mut self`, and callers serialize
//! access (see [`crate::pipeline::orchestrator`]). Violations of its structural invariants are
//! bugs in the scheduler and panic.

pub mod walk;

use std::collections::{BTreeMap, HashMap};

use crate::types::{JobDetails, JobId, JobKey, Product, ProductId, SourceFile, SourceId};

/// An output path in one of the two namespaces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Claim {
    /// Logical source namespace, shared by authored files and intermediate outputs.
    Source(String),
    /// Per-platform product namespace.
    Product { platform: String, path: String },
}

impl Claim {
    /// The claim a committed product holds.
    pub fn of(product: &Product) -> Self {
        if product.is_intermediate() {
            Claim::Source(product.path.clone())
        } else {
            Claim::Product {
                platform: product.platform.clone(),
                path: product.path.clone(),
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Claim::Source(p) => p.clone(),
            Claim::Product { platform, path } => format!("{platform}/{path}"),
        }
    }
}

/// Owner of a claim: the source, and the builder whose job emitted it (`None` for an authored file claiming its own path).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimOwner {
    pub source: SourceId,
    pub builder: Option<String>,
}

#[derive(Default, Debug)]
pub struct DependencyGraph {
    sources: HashMap<SourceId, SourceFile>,
    by_path: HashMap<String, SourceId>,
    jobs: BTreeMap<JobId, JobDetails>,
    jobs_by_source: HashMap<SourceId, Vec<JobId>>,
    products: BTreeMap<ProductId, Product>,
    products_by_job: HashMap<JobId, Vec<ProductId>>,
    /// Latest completed job per (source, builder, platform); owns the committed products.
    latest: HashMap<JobKey, JobId>,
    claims: HashMap<Claim, ClaimOwner>,
    /// Job that took each claim from a different owner, for claims taken by a job in this session.
    acquired: HashMap<Claim, JobId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- sources ----

    pub fn insert_source(&mut self, source: SourceFile) {
        if let Some(existing) = self.by_path.get(&source.path) {
            panic!(
                "source path '{}' already held by {}; cannot insert {}",
                source.path, existing, source.id
            );
        }
        self.by_path.insert(source.path.clone(), source.id);
        self.jobs_by_source.entry(source.id).or_default();
        self.sources.insert(source.id, source);
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceFile> {
        self.sources.get(&id)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut SourceFile> {
        self.sources.get_mut(&id)
    }

    pub fn source_by_path(&self, path: &str) -> Option<&SourceFile> {
        self.by_path.get(path).and_then(|id| self.sources.get(id))
    }

    pub fn contains_source(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceFile> {
        self.sources.values()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Remove a source record. Its jobs and products must already be gone.
    pub fn remove_source(&mut self, id: SourceId) -> SourceFile {
        let Some(source) = self.sources.remove(&id) else {
            panic!("double delete of source {id}");
        };
        if let Some(jobs) = self.jobs_by_source.remove(&id)
            && !jobs.is_empty()
        {
            panic!(
                "source '{}' removed with {} live jobs",
                source.path,
                jobs.len()
            );
        }
        self.by_path.remove(&source.path);
        source
    }

    // ---- jobs ----

    pub fn insert_job(&mut self, job: JobDetails) {
        let Some(list) = self.jobs_by_source.get_mut(&job.source_id) else {
            panic!("job {} references unknown source {}", job.id, job.source_id);
        };
        list.push(job.id);
        self.jobs.insert(job.id, job);
    }

    pub fn job(&self, id: JobId) -> Option<&JobDetails> {
        self.jobs.get(&id)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut JobDetails> {
        self.jobs.get_mut(&id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobDetails> {
        self.jobs.values()
    }

    /// Jobs of a source in creation order.
    pub fn jobs_for_source(&self, id: SourceId) -> Vec<&JobDetails> {
        self.jobs_by_source
            .get(&id)
            .map(|ids| ids.iter().filter_map(|j| self.jobs.get(j)).collect())
            .unwrap_or_default()
    }

    pub fn job_ids_for_source(&self, id: SourceId) -> Vec<JobId> {
        self.jobs_by_source.get(&id).cloned().unwrap_or_default()
    }

    /// Remove a job record. Its products must already be gone.
    pub fn remove_job(&mut self, id: JobId) -> JobDetails {
        let Some(job) = self.jobs.remove(&id) else {
            panic!("double delete of job {id}");
        };
        if self.products_by_job.get(&id).is_some_and(|p| !p.is_empty()) {
            panic!("job {id} removed while it still owns products");
        }
        self.products_by_job.remove(&id);
        if let Some(list) = self.jobs_by_source.get_mut(&job.source_id) {
            list.retain(|j| *j != id);
        }
        let key = job.key();
        if self.latest.get(&key) == Some(&id) {
            self.latest.remove(&key);
        }
        job
    }

    /// Drop terminal jobs of `source` from passes before `pass` that own no products.
    /// Keeps the job log bounded across rebuilds.
    pub fn prune_jobs(&mut self, source: SourceId, pass: u64) -> Vec<JobId> {
        let stale: Vec<JobId> = self
            .jobs_for_source(source)
            .into_iter()
            .filter(|j| j.pass < pass && j.status.is_terminal())
            .filter(|j| self.products_by_job.get(&j.id).is_none_or(|p| p.is_empty()))
            .filter(|j| self.latest.get(&j.key()) != Some(&j.id))
            .map(|j| j.id)
            .collect();
        for id in &stale {
            self.remove_job(*id);
        }
        stale
    }

    pub fn latest_job(&self, key: &JobKey) -> Option<&JobDetails> {
        self.latest.get(key).and_then(|id| self.jobs.get(id))
    }

    pub fn set_latest(&mut self, key: JobKey, job: JobId) -> Option<JobId> {
        self.latest.insert(key, job)
    }

    /// Drop `job` as the latest run of `key`, so the next generation does not skip it.
    pub fn forget_latest(&mut self, key: &JobKey, job: JobId) {
        if self.latest.get(key) == Some(&job) {
            self.latest.remove(key);
        }
    }

    // ---- products ----

    pub fn insert_product(&mut self, product: Product) {
        if !self.jobs.contains_key(&product.job_id) {
            panic!(
                "product '{}' references unknown job {}",
                product.path, product.job_id
            );
        }
        self.products_by_job
            .entry(product.job_id)
            .or_default()
            .push(product.id);
        self.products.insert(product.id, product);
    }

    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn product_mut(&mut self, id: ProductId) -> Option<&mut Product> {
        self.products.get_mut(&id)
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn products_of_job(&self, job: JobId) -> Vec<&Product> {
        self.products_by_job
            .get(&job)
            .map(|ids| ids.iter().filter_map(|p| self.products.get(p)).collect())
            .unwrap_or_default()
    }

    /// All committed products of a source, across its jobs.
    pub fn products_of_source(&self, source: SourceId) -> Vec<&Product> {
        self.jobs_by_source
            .get(&source)
            .into_iter()
            .flatten()
            .flat_map(|j| self.products_of_job(*j))
            .collect()
    }

    pub fn remove_product(&mut self, id: ProductId) -> Product {
        let Some(product) = self.products.remove(&id) else {
            panic!("double delete of product {}", id.0);
        };
        if let Some(list) = self.products_by_job.get_mut(&product.job_id) {
            list.retain(|p| *p != id);
        }
        product
    }

    // ---- claims (reverse index) ----

    pub fn claim_owner(&self, claim: &Claim) -> Option<&ClaimOwner> {
        self.claims.get(claim)
    }

    pub fn claim(&mut self, claim: Claim, owner: ClaimOwner) {
        self.acquired.remove(&claim);
        self.claims.insert(claim, owner);
    }

    /// Claim on behalf of a job. A re-claim by the current owner keeps the original acquisition.
    pub fn claim_by_job(&mut self, claim: Claim, owner: ClaimOwner, job: JobId) {
        if self.claims.get(&claim) != Some(&owner) {
            self.acquired.insert(claim.clone(), job);
        }
        self.claims.insert(claim, owner);
    }

    /// The job that took `claim` from its previous owner, when known.
    pub fn acquired_by(&self, claim: &Claim) -> Option<JobId> {
        self.acquired.get(claim).copied()
    }

    /// Release `claim` if held by `source`. Returns whether it was released.
    pub fn release(&mut self, claim: &Claim, source: SourceId) -> bool {
        if self.claims.get(claim).is_some_and(|o| o.source == source) {
            self.claims.remove(claim);
            self.acquired.remove(claim);
            true
        } else {
            false
        }
    }

    pub fn claims(&self) -> impl Iterator<Item = (&Claim, &ClaimOwner)> {
        self.claims.iter()
    }
}
