//! Checkpoint and restore of the pipeline state, and reconciliation against a fresh scan.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};

use crate::graph::{Claim, ClaimOwner, DependencyGraph};
use crate::registry::BuilderRegistry;
use crate::types::{
    FileEvent, Fingerprint, JobDetails, JobStatus, PipelineConfig, Product, SourceFile,
    SourceState,
};

use super::core::AssetPipeline;
use super::incremental::{FingerprintKey, IncrementalScheduler};
use super::jobs::IdAllocator;

/// Everything needed to resume incremental work in a later process.
#[derive(Debug, Default, Clone)]
pub struct GraphSnapshot {
    pub sources: Vec<SourceFile>,
    /// Terminal jobs only; queued and running work is redone after restore.
    pub jobs: Vec<JobDetails>,
    pub products: Vec<Product>,
    pub fingerprints: Vec<(FingerprintKey, Fingerprint)>,
    pub last_job: u64,
    pub last_product: u64,
    pub pass: u64,
}

impl AssetPipeline {
    /// Capture the committed graph. Sources with unfinished work are saved dirty so they rebuild.
    pub fn snapshot(&self) -> GraphSnapshot {
        let graph = self.graph();
        let mut sources: Vec<SourceFile> = graph.sources().cloned().collect();
        for s in &mut sources {
            if matches!(s.state, SourceState::Queued | SourceState::Processing) {
                s.state = SourceState::Unprocessed;
                s.dirty = true;
            }
        }
        sources.sort_by(|a, b| a.path.cmp(&b.path));
        let ids = self.ids();
        GraphSnapshot {
            sources,
            jobs: graph
                .jobs()
                .filter(|j| j.status.is_terminal())
                .cloned()
                .collect(),
            products: graph.products().cloned().collect(),
            fingerprints: self
                .incremental()
                .entries()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            last_job: ids.last_job(),
            last_product: ids.last_product(),
            pass: self.pass(),
        }
    }

    /// Rebuild a pipeline from a checkpoint. Records that reference missing parents are dropped.
    pub fn restore(
        registry: Arc<BuilderRegistry>,
        config: PipelineConfig,
        snapshot: GraphSnapshot,
    ) -> Self {
        let mut graph = DependencyGraph::new();
        for source in snapshot.sources {
            if graph.source_by_path(&source.path).is_some() {
                warn!("Checkpoint lists {} twice; keeping the first", source.path);
                continue;
            }
            if source.produced_by.is_none() {
                graph.claim(
                    Claim::Source(source.path.clone()),
                    ClaimOwner {
                        source: source.id,
                        builder: None,
                    },
                );
            }
            graph.insert_source(source);
        }

        let mut jobs = snapshot.jobs;
        jobs.sort_by_key(|j| j.id);
        for job in jobs {
            if !graph.contains_source(job.source_id) {
                debug!("Dropping job {} of unknown source {}", job.id, job.source_id);
                continue;
            }
            let key = job.key();
            let completed = job.status == JobStatus::Completed;
            let id = job.id;
            graph.insert_job(job);
            if completed {
                graph.set_latest(key, id);
            }
        }

        let mut products = snapshot.products;
        products.sort_by_key(|p| p.id);
        for product in products {
            if graph.job(product.job_id).is_none() {
                debug!("Dropping product {} of unknown job {}", product.path, product.job_id);
                continue;
            }
            let claim = if product.is_intermediate() {
                Claim::Source(product.path.clone())
            } else {
                Claim::Product {
                    platform: product.platform.clone(),
                    path: product.path.clone(),
                }
            };
            graph.claim(
                claim,
                ClaimOwner {
                    source: product.source_id,
                    builder: Some(product.builder_id.clone()),
                },
            );
            graph.insert_product(product);
        }

        // Edges whose endpoints did not survive are cut.
        let dangling: Vec<_> = graph
            .products()
            .filter(|p| p.intermediate_source.is_some_and(|s| !graph.contains_source(s)))
            .map(|p| p.id)
            .collect();
        for id in dangling {
            if let Some(p) = graph.product_mut(id) {
                p.intermediate_source = None;
            }
        }

        let live: HashSet<_> = graph.sources().map(|s| s.id).collect();
        let incremental = IncrementalScheduler::from_entries(
            snapshot
                .fingerprints
                .into_iter()
                .filter(|(k, _)| live.contains(&k.source_id)),
        );
        AssetPipeline::from_parts(
            registry,
            config,
            graph,
            incremental,
            IdAllocator::resume(snapshot.last_job, snapshot.last_product),
            snapshot.pass,
        )
    }

    /// Compare the restored graph to the files on disk (workspace-relative path -> fingerprint).
    ///
    /// Missing sources and product files become Deleted events, changed or dirty sources Modified,
    /// and unknown authored or intermediate files Added. Deletions come first; each group is in
    /// path order.
    pub fn reconcile(&self, current: &BTreeMap<String, Fingerprint>) -> Vec<FileEvent> {
        let config = self.config();
        let graph = self.graph();
        let product_root = |p: &str| {
            super::tools::strip_root(p, &config.cache_root).is_some()
                && super::tools::strip_root(p, &config.intermediate_root()).is_none()
        };

        let mut known: HashSet<String> = HashSet::new();
        let mut deleted = Vec::new();
        let mut changed = Vec::new();
        for source in graph.sources() {
            let file = if source.produced_by.is_some() {
                config.intermediate_path(&source.path)
            } else {
                source.path.clone()
            };
            match current.get(&file) {
                None => deleted.push(file.clone()),
                Some(fp) if *fp != source.fingerprint || source.dirty => {
                    changed.push(FileEvent::Modified {
                        path: file.clone(),
                        fingerprint: *fp,
                    });
                }
                Some(_) => {}
            }
            known.insert(file);
        }
        for product in graph.products().filter(|p| !p.is_intermediate()) {
            let file = self.product_file(product);
            if !current.contains_key(&file) {
                deleted.push(file);
            }
        }
        deleted.sort();
        deleted.dedup();
        changed.sort_by(|a, b| a.path().cmp(b.path()));

        let added = current
            .iter()
            .filter(|(path, _)| !known.contains(*path) && !product_root(path))
            .map(|(path, fp)| FileEvent::Added {
                path: path.clone(),
                fingerprint: *fp,
            });

        let mut events: Vec<FileEvent> = deleted
            .into_iter()
            .map(|path| FileEvent::Deleted { path })
            .collect();
        let mut rest: Vec<FileEvent> = changed.into_iter().chain(added).collect();
        rest.sort_by(|a, b| a.path().cmp(b.path()));
        events.extend(rest);
        events
    }
}
