use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Incremental asset pipeline: scan a project, schedule builders, chain intermediates.
#[derive(Clone, Parser)]
#[command(name = "refinery")]
#[command(about = "Build a project's assets incrementally; use --dry-run to see what would rebuild.")]
pub struct Cli {
    /// Project directory. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Path to the checkpoint file. Default: `.refinery` in DIR.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Compare the project to the checkpoint and report what would rebuild; run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Target platforms for per-platform builders. Can specify multiple: -p pc linux
    #[arg(long, short = 'p', num_args = 1..)]
    pub platform: Vec<String>,

    /// Force the chains containing these paths to rebuild.
    #[arg(long, short = 'r', num_args = 1..)]
    pub reprocess: Vec<String>,

    /// Print the job log as JSON lines when done.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// List every failed job instead of a summary.
    #[arg(long, short = 'l', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub list: Option<bool>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Fingerprint sources with blake3 content hashes instead of mtime and size.
    #[arg(long, short = 'c', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub check_hash: Option<bool>,

    /// Follow symbolic links.
    #[arg(long, short = 'f', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub follow_links: Option<bool>,

    /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2 pattern3
    #[arg(long, short = 'e', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Strict mode: fail on first scan error instead of skipping the path.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict: Option<bool>,

    /// Scan with a parallel walker (jwalk).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub parallel_scan: Option<bool>,

    /// Number of builder worker threads.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,
}

impl Cli {
    /// Get the database path, defaulting to package db filename in the target directory.
    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| self.dir.join(PackagePaths::get().output_filename()))
    }
}
