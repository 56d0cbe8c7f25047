//! Public and internal types for the refinery API and pipeline.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Platform identifier used for jobs of `Common`-scope builders and for intermediate outputs.
pub const COMMON_PLATFORM: &str = "common";

/// Stable identity of a [`SourceFile`]. Survives checkpoint/restore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    pub fn new() -> Self {
        SourceId(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Job run key. Monotonic within one pipeline (restored from the checkpoint on startup).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub u64);

/// Content-derived value used to decide whether reprocessing is necessary.
///
/// Either a blake3 hash of the file bytes, or a blake3 hash of `(mtime_ns, size)` when content
/// hashing is off.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint(*blake3::hash(bytes).as_bytes())
    }

    pub fn of_metadata(mtime_ns: i64, size: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&mtime_ns.to_le_bytes());
        hasher.update(&size.to_le_bytes());
        Fingerprint(*hasher.finalize().as_bytes())
    }

    /// Rebuild from a stored blob. `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Fingerprint(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short hex prefix is enough to tell fingerprints apart in logs.
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Whether a source was written by a person or synthesized by a build step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Authored,
    Intermediate,
}

/// Per-source state machine. Modification sends `Completed`/`Failed` back to `Queued`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Unprocessed,
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Authored or pipeline-synthesized unit of input to the build graph.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub id: SourceId,
    /// Logical relative path (forward slashes). Intermediate sources drop the intermediate root prefix.
    pub path: String,
    pub fingerprint: Fingerprint,
    /// Set only for synthetic sources: the job whose product this source is.
    pub produced_by: Option<JobId>,
    /// The intermediate product this source was created from (the dependency edge).
    pub produced_by_product: Option<ProductId>,
    pub state: SourceState,
    /// Marked by reprocess requests; cleared when a new generation pass is queued.
    pub dirty: bool,
    /// Latest generation pass. Job completions from older passes are stale.
    pub pass: u64,
}

impl SourceFile {
    pub fn origin(&self) -> Origin {
        if self.produced_by.is_some() {
            Origin::Intermediate
        } else {
            Origin::Authored
        }
    }
}

/// Where a builder's outputs land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformScope {
    /// One job per configured target platform.
    PerPlatform,
    /// One job on the `common` platform.
    Common,
}

bitflags! {
    /// Declared output kind of a builder. Exactly one flag must be set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ProductOutputFlags: u8 {
        /// Terminal output, not consumed by further stages.
        const PRODUCT_ASSET = 0b01;
        /// Output fed back into the pipeline as a synthetic source.
        const INTERMEDIATE_ASSET = 0b10;
    }
}

/// Registered build rule. Immutable after registration.
#[derive(Clone, Debug)]
pub struct BuilderDescriptor {
    pub id: String,
    /// Glob patterns (`*`, `?`), matched case-insensitively against file name or relative path.
    pub patterns: Vec<String>,
    pub scope: PlatformScope,
    pub flags: ProductOutputFlags,
    /// Higher runs first.
    pub priority: i32,
    /// Bumping the version invalidates everything the builder produced before.
    pub version: u32,
}

impl BuilderDescriptor {
    pub fn new(
        id: impl Into<String>,
        patterns: &[&str],
        scope: PlatformScope,
        flags: ProductOutputFlags,
    ) -> Self {
        BuilderDescriptor {
            id: id.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            scope,
            flags,
            priority: 0,
            version: 1,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn is_intermediate(&self) -> bool {
        self.flags.contains(ProductOutputFlags::INTERMEDIATE_ASSET)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One scheduled build step.
#[derive(Clone, Debug, Serialize)]
pub struct JobDetails {
    pub id: JobId,
    pub source_id: SourceId,
    /// Logical path of the source.
    pub source_path: String,
    /// Workspace-relative location of the input file (intermediate sources live under the cache).
    pub input_path: String,
    pub builder_id: String,
    pub builder_version: u32,
    pub platform: String,
    /// Builder emits intermediate sources rather than terminal products.
    pub intermediate: bool,
    /// Job exists only to surface an error in the job log.
    pub auto_fail: bool,
    pub fail_reason: Option<String>,
    pub input_fingerprint: Fingerprint,
    /// Jobs this one depends on (the job that produced a synthetic source).
    pub upstream: Vec<JobId>,
    pub status: JobStatus,
    pub pass: u64,
    /// Generated by a reprocess request; bypasses incremental skipping.
    pub forced: bool,
}

impl JobDetails {
    /// (source, builder, platform): identity of a job across runs.
    pub fn key(&self) -> JobKey {
        JobKey {
            source_id: self.source_id,
            builder_id: self.builder_id.clone(),
            platform: self.platform.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub source_id: SourceId,
    pub builder_id: String,
    pub platform: String,
}

/// One build output, committed to the graph on job completion.
#[derive(Clone, Debug)]
pub struct Product {
    pub id: ProductId,
    pub job_id: JobId,
    pub source_id: SourceId,
    pub builder_id: String,
    /// Relative output path (below the platform or intermediate root).
    pub path: String,
    pub platform: String,
    pub flags: ProductOutputFlags,
    pub sub_id: u32,
    pub fingerprint: Fingerprint,
    /// Synthetic source this product became (intermediate products only).
    pub intermediate_source: Option<SourceId>,
}

impl Product {
    pub fn is_intermediate(&self) -> bool {
        self.flags.contains(ProductOutputFlags::INTERMEDIATE_ASSET)
    }
}

/// One output as reported by a runner on job completion. Flags come from the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductOutput {
    pub path: String,
    pub sub_id: u32,
    pub fingerprint: Fingerprint,
}

impl ProductOutput {
    pub fn new(path: impl Into<String>, sub_id: u32, fingerprint: Fingerprint) -> Self {
        ProductOutput {
            path: path.into(),
            sub_id,
            fingerprint,
        }
    }
}

/// File-system event as delivered by a watcher or synthesized by the pipeline.
/// Paths are workspace-relative with forward slashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileEvent {
    Added { path: String, fingerprint: Fingerprint },
    Modified { path: String, fingerprint: Fingerprint },
    Deleted { path: String },
    FolderDeleted { path: String },
}

impl FileEvent {
    pub fn path(&self) -> &str {
        match self {
            FileEvent::Added { path, .. }
            | FileEvent::Modified { path, .. }
            | FileEvent::Deleted { path }
            | FileEvent::FolderDeleted { path } => path,
        }
    }
}

/// One file found by the scan: workspace-relative path and fingerprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEntry {
    pub path: String,
    pub fingerprint: Fingerprint,
}

/// Result of comparing the live tree to a restored checkpoint.
#[derive(Default, Debug)]
pub struct Diff {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Lib-facing configuration of the core. See [`Opts`] for the CLI superset.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Target platforms for `PerPlatform` builders.
    pub platforms: Vec<String>,
    /// Workspace-relative cache root holding product and intermediate folders.
    pub cache_root: String,
    /// Folder under `cache_root` holding intermediate sources.
    pub intermediate_folder: String,
    /// Sources with longer logical paths get one autoFail job per matching builder.
    pub max_path_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            platforms: vec![crate::utils::config::DEFAULT_PLATFORM.to_string()],
            cache_root: crate::utils::config::CacheLayout::CACHE_ROOT.to_string(),
            intermediate_folder: crate::utils::config::CacheLayout::INTERMEDIATE_FOLDER.to_string(),
            max_path_len: crate::utils::config::MAX_SOURCE_PATH_LEN,
        }
    }
}

impl PipelineConfig {
    /// Workspace-relative intermediate root, e.g. `Cache/IntermediateAssets`.
    pub fn intermediate_root(&self) -> String {
        format!("{}/{}", self.cache_root, self.intermediate_folder)
    }

    /// Workspace-relative location of an intermediate source.
    pub fn intermediate_path(&self, rel: &str) -> String {
        format!("{}/{}", self.intermediate_root(), rel)
    }

    /// Workspace-relative location of a product for `platform`.
    pub fn product_path(&self, platform: &str, rel: &str) -> String {
        format!("{}/{}/{}", self.cache_root, platform, rel)
    }
}

/// Full options (CLI, build and check). [`PipelineConfig`] is the core subset.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    /// Checkpoint database path. When None, uses `root.join(<package db filename>)` (e.g. `.refinery`).
    pub db_path: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    /// Fingerprint sources by content (blake3) instead of mtime+size.
    pub with_hash: bool,
    /// Follow symbolic links while scanning.
    pub follow_links: bool,
    /// Exclude patterns (glob syntax).
    pub exclude: Vec<String>,
    /// Scan with jwalk instead of walkdir.
    pub parallel_scan: bool,
    /// Override runner worker count. When None, derived from available threads and FD limit.
    pub workers: Option<usize>,
    /// Show progress bar and debug logs.
    pub verbose: bool,
    /// Fail on first scan error instead of skipping the path.
    pub strict: bool,
    /// Print the job log as JSON lines after the build.
    pub json: bool,
    /// List every failed job instead of a summary above the list threshold.
    pub list: bool,
    /// Paths to force-reprocess after the scan.
    pub reprocess: Vec<String>,
}
