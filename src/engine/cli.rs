//! CLI command handler: build by default; --dry-run reports what would rebuild without running jobs.

use anyhow::Result;
use log::{debug, warn};

use crate::Opts;
use crate::engine::arg_parser::Cli;
use crate::engine::handlers::{handle_build, handle_check};
use crate::utils::refinery_toml::{BuilderConfig, apply_file_to_opts, load_refinery_toml};
use crate::utils::setup_logging;

/// Opts from `.refinery.toml` (when present) overridden by CLI flags, plus the configured builders.
fn setup_opts(cli: &Cli) -> (Opts, Vec<BuilderConfig>) {
    let mut opts = Opts::default();
    let file = load_refinery_toml(&cli.dir);
    if let Some(ref file) = file {
        apply_file_to_opts(file, &mut opts);
        // A relative db_path in the project file is relative to the project.
        opts.db_path = opts
            .db_path
            .take()
            .map(|p| if p.is_relative() { cli.dir.join(p) } else { p });
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    setup_logging(opts.verbose);

    if cli.db.is_some() || opts.db_path.is_none() {
        opts.db_path = Some(cli.db_path());
    }
    if !cli.platform.is_empty() {
        opts.pipeline.platforms = cli.platform.clone();
    }
    if let Some(v) = cli.check_hash {
        opts.with_hash = v;
    }
    if let Some(v) = cli.follow_links {
        opts.follow_links = v;
    }
    if let Some(v) = cli.strict {
        opts.strict = v;
    }
    if let Some(v) = cli.parallel_scan {
        opts.parallel_scan = v;
    }
    if let Some(v) = cli.json {
        opts.json = v;
    }
    if let Some(v) = cli.list {
        opts.list = v;
    }
    if cli.workers.is_some() {
        opts.workers = cli.workers;
    }
    opts.exclude.extend(cli.exclude.iter().cloned());
    opts.reprocess = cli.reprocess.clone();

    let builders = file.map(|f| f.builders()).unwrap_or_default();
    (opts, builders)
}

/// Run a build (default) or a dry run when --dry-run. A dry run never writes the checkpoint.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, builders) = setup_opts(cli);
    debug!("{} CONFIG: {:#?}", env!("CARGO_PKG_NAME").to_uppercase(), opts);
    if cli.dry_run {
        warn!("RUNNING IN DRY-RUN MODE. NO JOBS WILL RUN AND THE CHECKPOINT IS NOT WRITTEN.");
        handle_check(&cli.dir, &opts, &builders)
    } else {
        debug!("Building directory...");
        handle_build(&cli.dir, &opts, &builders)
    }
}
