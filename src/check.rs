//! Dry run: compare the project to its checkpoint and report what a build would do.

use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::{db_path_for, load_pipeline, register_builders};
use crate::engine::tools::check_root_and_canonicalize;
use crate::pipeline::collect_scan;
use crate::types::FileEvent;
use crate::utils::Colors;
use crate::utils::refinery_toml::BuilderConfig;
use crate::utils::tempfiles::temp_path_for;
use crate::{Diff, Opts};

/// Changes since the last checkpoint and the number of jobs they would queue.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub diff: Diff,
    pub would_queue: usize,
}

/// Compare directory at `root` to the checkpoint. Nothing is run and nothing is written.
pub fn check_dir(root: &Path, opts: &Opts, builders: &[BuilderConfig]) -> Result<CheckReport> {
    let root = check_root_and_canonicalize(root)?;
    let db_path = db_path_for(&root, opts);
    let registry = Arc::new(register_builders(builders));
    let mut pipeline = load_pipeline(&db_path, registry, opts.pipeline.clone())?;
    let skip = vec![db_path.clone(), temp_path_for(&db_path)];
    let current = collect_scan(&root, opts, &skip)?;

    let events = pipeline.reconcile(&current);
    let mut diff = Diff::default();
    for event in &events {
        let path = PathBuf::from(event.path());
        match event {
            FileEvent::Added { .. } => diff.added.push(path),
            FileEvent::Modified { .. } => diff.modified.push(path),
            FileEvent::Deleted { .. } | FileEvent::FolderDeleted { .. } => diff.removed.push(path),
        }
    }

    // Play the changes against the in-memory graph only.
    for event in events {
        pipeline.handle_event(event);
    }
    for path in &opts.reprocess {
        pipeline.request_reprocess(path);
    }
    let report = CheckReport {
        diff,
        would_queue: pipeline.pending_count(),
    };
    print_check(&report, opts.verbose);
    Ok(report)
}

/// Print diff summary
fn print_check(report: &CheckReport, verbose: bool) {
    let diff = &report.diff;
    if diff.is_empty() && report.would_queue == 0 {
        info!("Up to date.");
        return;
    }

    info!(
        "{} | {} | {} | {} jobs would run",
        Colors::added(&format!("Added: {}", diff.added.len())),
        Colors::removed(&format!("Removed: {}", diff.removed.len())),
        Colors::modified(&format!("Modified: {}", diff.modified.len())),
        report.would_queue
    );
    if verbose {
        for p in &diff.added {
            debug!("{}", Colors::added(&format!("+ {}", p.display())));
        }
        for p in &diff.removed {
            debug!("{}", Colors::removed(&format!("- {}", p.display())));
        }
        for p in &diff.modified {
            debug!("{}", Colors::modified(&format!("~ {}", p.display())));
        }
    }
}
