//! Job generation: one job per matching builder and target platform.

use log::debug;

use crate::graph::DependencyGraph;
use crate::registry::BuilderRegistry;
use crate::types::{
    BuilderDescriptor, COMMON_PLATFORM, JobDetails, JobId, JobKey, JobStatus, Origin,
    PipelineConfig, PlatformScope, ProductId, SourceFile,
};

/// Monotonic id source for jobs and products. Restored from the checkpoint so ids never repeat.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdAllocator {
    next_job: u64,
    next_product: u64,
}

impl IdAllocator {
    /// Continue after the highest ids already handed out.
    pub fn resume(last_job: u64, last_product: u64) -> Self {
        Self {
            next_job: last_job,
            next_product: last_product,
        }
    }

    pub fn job(&mut self) -> JobId {
        self.next_job += 1;
        JobId(self.next_job)
    }

    pub fn product(&mut self) -> ProductId {
        self.next_product += 1;
        ProductId(self.next_product)
    }

    pub fn last_job(&self) -> u64 {
        self.next_job
    }

    pub fn last_product(&self) -> u64 {
        self.next_product
    }
}

/// Expands a source into jobs. Holds no state of its own.
pub struct JobGenerator<'a> {
    registry: &'a BuilderRegistry,
    config: &'a PipelineConfig,
}

impl<'a> JobGenerator<'a> {
    pub fn new(registry: &'a BuilderRegistry, config: &'a PipelineConfig) -> Self {
        Self { registry, config }
    }

    /// Jobs for `source` in generation pass `pass`, highest builder priority first.
    ///
    /// A job whose latest completed run saw the same input fingerprint and builder version is
    /// skipped unless `forced`. Incompatible combinations yield a single autoFail job for that
    /// builder instead of normal jobs.
    pub fn generate(
        &self,
        graph: &DependencyGraph,
        source: &SourceFile,
        pass: u64,
        forced: bool,
        ids: &mut IdAllocator,
    ) -> Vec<JobDetails> {
        let mut jobs = Vec::new();
        for builder in self.registry.match_builders(&source.path) {
            let platforms: Vec<&str> = match builder.scope {
                PlatformScope::Common => vec![COMMON_PLATFORM],
                PlatformScope::PerPlatform => {
                    self.config.platforms.iter().map(String::as_str).collect()
                }
            };
            if source.path.len() > self.config.max_path_len {
                let reason = format!(
                    "Source path is {} characters long, above the limit of {}",
                    source.path.len(),
                    self.config.max_path_len
                );
                // Recorded against the first platform the builder would have run on.
                let platform = platforms.first().copied().unwrap_or(COMMON_PLATFORM);
                jobs.push(self.auto_fail(source, builder, platform, pass, reason, ids));
                continue;
            }
            if platforms.is_empty() {
                let reason = format!(
                    "Builder '{}' is PerPlatform but no target platforms are enabled",
                    builder.id
                );
                jobs.push(self.auto_fail(source, builder, COMMON_PLATFORM, pass, reason, ids));
                continue;
            }
            for platform in platforms {
                let key = JobKey {
                    source_id: source.id,
                    builder_id: builder.id.clone(),
                    platform: platform.to_string(),
                };
                if !forced
                    && let Some(prev) = graph.latest_job(&key)
                    && prev.input_fingerprint == source.fingerprint
                    && prev.builder_version == builder.version
                {
                    debug!(
                        "{} [{}/{}] up to date (job {})",
                        source.path, builder.id, platform, prev.id
                    );
                    continue;
                }
                jobs.push(self.job(source, builder, platform, pass, forced, ids));
            }
        }
        jobs
    }

    fn job(
        &self,
        source: &SourceFile,
        builder: &BuilderDescriptor,
        platform: &str,
        pass: u64,
        forced: bool,
        ids: &mut IdAllocator,
    ) -> JobDetails {
        let input_path = match source.origin() {
            Origin::Authored => source.path.clone(),
            Origin::Intermediate => self.config.intermediate_path(&source.path),
        };
        JobDetails {
            id: ids.job(),
            source_id: source.id,
            source_path: source.path.clone(),
            input_path,
            builder_id: builder.id.clone(),
            builder_version: builder.version,
            platform: platform.to_string(),
            intermediate: builder.is_intermediate(),
            auto_fail: false,
            fail_reason: None,
            input_fingerprint: source.fingerprint,
            upstream: source.produced_by.into_iter().collect(),
            status: JobStatus::Queued,
            pass,
            forced,
        }
    }

    fn auto_fail(
        &self,
        source: &SourceFile,
        builder: &BuilderDescriptor,
        platform: &str,
        pass: u64,
        reason: String,
        ids: &mut IdAllocator,
    ) -> JobDetails {
        JobDetails {
            auto_fail: true,
            fail_reason: Some(reason),
            status: JobStatus::Failed,
            ..self.job(source, builder, platform, pass, false, ids)
        }
    }
}
