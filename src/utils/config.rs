//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived paths: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    db_filename: String,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache paths from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                db_filename: format!(".{pkg}"),
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Checkpoint database filename (e.g. `.refinery`).
    pub fn output_filename(&self) -> &str {
        &self.db_filename
    }

    /// Project config filename (e.g. `.refinery.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Names excluded from the scan by default: the project file, the default checkpoint DB with
    /// its WAL/SHM/temp siblings, and VCS metadata. A DB at a custom path is skipped by canonical path.
    pub fn default_exclude_patterns(&self) -> Vec<String> {
        vec![
            self.config_filename().to_string(),
            format!("{}*", self.db_filename),
            ".git".to_string(),
        ]
    }
}

// ---- Cache layout ----

/// Default folder names below the project root.
pub struct CacheLayout;

impl CacheLayout {
    /// Workspace-relative root of all build outputs.
    pub const CACHE_ROOT: &'static str = "Cache";
    /// Folder under the cache root holding intermediate sources.
    pub const INTERMEDIATE_FOLDER: &'static str = "IntermediateAssets";
}

/// Platform used when neither config nor CLI name one.
pub const DEFAULT_PLATFORM: &str = "pc";

/// Longest logical source path accepted before jobs are auto-failed.
pub const MAX_SOURCE_PATH_LEN: usize = 1024;

// ---- Worker threads ----

/// Thread limits for the local runner.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor / minimum worker count.
    pub floor: usize,
    /// Cap regardless of core count; builders are I/O heavy.
    pub max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            max: Self::MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 1;
    pub const MAX_THREADS: usize = 16;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Worker count clamped to `[floor, max]`.
    pub fn workers(&self) -> usize {
        self.all_threads.clamp(self.floor, self.max)
    }
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
    /// Files smaller than this are always content-hashed (bytes).
    pub const SMALL_FILE_THRESHOLD: u64 = 4 * 1024;
}

// ---- Scan channel cap ----

/// Path and entry channel capacity during the initial scan.
pub const SCAN_CHANNEL_CAP: usize = 50_000;

// ---- Job log output ----

/// When listing the job log, more failed jobs than this are summarized instead of listed.
pub const LIST_THRESHOLD: usize = 100;
