//! Incremental scheduling: product fingerprints decide which downstream work is necessary.

use std::collections::HashMap;

use log::debug;

use crate::graph::{Claim, ClaimOwner, DependencyGraph};
use crate::types::{
    COMMON_PLATFORM, Fingerprint, JobDetails, JobStatus, Product, ProductId, ProductOutput,
    ProductOutputFlags, SourceId,
};

use super::jobs::IdAllocator;

/// Identity of one output across runs: (source, builder, platform, sub id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FingerprintKey {
    pub source_id: SourceId,
    pub builder_id: String,
    pub platform: String,
    pub sub_id: u32,
}

impl FingerprintKey {
    pub fn of(product: &Product) -> Self {
        FingerprintKey {
            source_id: product.source_id,
            builder_id: product.builder_id.clone(),
            platform: product.platform.clone(),
            sub_id: product.sub_id,
        }
    }
}

/// Products committed by one job completion.
#[derive(Debug, Default)]
pub struct Commit {
    pub committed: Vec<ProductId>,
    /// Intermediate outputs that need an Added event: (logical path, fingerprint).
    pub synthesize: Vec<(String, Fingerprint)>,
    /// Products of the previous run of the same job that this run no longer emits.
    pub stale: Vec<ProductId>,
}

#[derive(Debug, Default)]
pub struct IncrementalScheduler {
    fingerprints: HashMap<FingerprintKey, Fingerprint>,
}

impl IncrementalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted fingerprints.
    pub fn from_entries(entries: impl IntoIterator<Item = (FingerprintKey, Fingerprint)>) -> Self {
        Self {
            fingerprints: entries.into_iter().collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&FingerprintKey, &Fingerprint)> {
        self.fingerprints.iter()
    }

    pub fn stored(&self, key: &FingerprintKey) -> Option<Fingerprint> {
        self.fingerprints.get(key).copied()
    }

    /// Store `fingerprint`; true when it is new or differs from the stored one.
    pub fn record(&mut self, key: FingerprintKey, fingerprint: Fingerprint) -> bool {
        self.fingerprints.insert(key, fingerprint) != Some(fingerprint)
    }

    pub fn forget(&mut self, key: &FingerprintKey) {
        self.fingerprints.remove(key);
    }

    pub fn forget_source(&mut self, source: SourceId) {
        self.fingerprints.retain(|k, _| k.source_id != source);
    }

    /// Commit a validated job's outputs.
    ///
    /// Outputs matching a product of the previous run (same path and sub id) keep that product's
    /// link to its synthetic source. An intermediate output synthesizes an Added event only when
    /// its fingerprint changed or its synthetic source does not exist yet, which is what stops
    /// unchanged work from propagating down the chain.
    pub fn commit(
        &mut self,
        graph: &mut DependencyGraph,
        job: &JobDetails,
        outputs: &[ProductOutput],
        ids: &mut IdAllocator,
    ) -> Commit {
        let key = job.key();
        let previous: Vec<Product> = graph
            .latest_job(&key)
            .filter(|prev| prev.id != job.id)
            .map(|prev| graph.products_of_job(prev.id).into_iter().cloned().collect())
            .unwrap_or_default();
        let mut carried: Vec<ProductId> = Vec::new();
        let mut commit = Commit::default();
        let flags = if job.intermediate {
            ProductOutputFlags::INTERMEDIATE_ASSET
        } else {
            ProductOutputFlags::PRODUCT_ASSET
        };
        let platform = if job.intermediate {
            COMMON_PLATFORM.to_string()
        } else {
            job.platform.clone()
        };

        for out in outputs {
            let changed = self.record(
                FingerprintKey {
                    source_id: job.source_id,
                    builder_id: job.builder_id.clone(),
                    platform: platform.clone(),
                    sub_id: out.sub_id,
                },
                out.fingerprint,
            );
            let prior = previous
                .iter()
                .find(|p| p.path == out.path && p.sub_id == out.sub_id);
            let child = prior
                .and_then(|p| p.intermediate_source)
                .filter(|s| graph.contains_source(*s));
            if let Some(p) = prior {
                graph.remove_product(p.id);
                carried.push(p.id);
            }
            let product = Product {
                id: ids.product(),
                job_id: job.id,
                source_id: job.source_id,
                builder_id: job.builder_id.clone(),
                path: out.path.clone(),
                platform: platform.clone(),
                flags,
                sub_id: out.sub_id,
                fingerprint: out.fingerprint,
                intermediate_source: child,
            };
            let claim = if job.intermediate {
                Claim::Source(out.path.clone())
            } else {
                Claim::Product {
                    platform: platform.clone(),
                    path: out.path.clone(),
                }
            };
            graph.claim_by_job(
                claim,
                ClaimOwner {
                    source: job.source_id,
                    builder: Some(job.builder_id.clone()),
                },
                job.id,
            );
            if job.intermediate {
                if let Some(child) = child
                    && let Some(s) = graph.source_mut(child)
                {
                    s.produced_by = Some(job.id);
                    s.produced_by_product = Some(product.id);
                }
                if changed || child.is_none() {
                    commit.synthesize.push((out.path.clone(), out.fingerprint));
                } else {
                    debug!("{} unchanged, not propagating", out.path);
                }
            }
            commit.committed.push(product.id);
            graph.insert_product(product);
        }

        commit.stale = previous
            .iter()
            .map(|p| p.id)
            .filter(|id| !carried.contains(id))
            .collect();
        graph.set_latest(key, job.id);
        if let Some(j) = graph.job_mut(job.id) {
            j.status = JobStatus::Completed;
        }
        commit
    }

    /// The whole chain `source` belongs to: its top-level ancestor first, then every descendant.
    pub fn reprocess_set(graph: &DependencyGraph, source: SourceId) -> Vec<SourceId> {
        let top = graph.top_level(source);
        let mut set = vec![top];
        set.extend(graph.descendants(top));
        set
    }

    /// Number of sources downstream of `source`.
    pub fn dependent_count(graph: &DependencyGraph, source: SourceId) -> usize {
        graph.descendants(source).len()
    }
}
