use anyhow::Result;
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::engine::tools::check_root_and_canonicalize;
use crate::pipeline;
use crate::types::Fingerprint;
use crate::utils::config::WorkerThreadLimits;
use crate::utils::fd_limit::capped_workers;

/// Start the walk + metadata scan. Returns receiver and handles; caller receives from
/// `entry_rx` and must join `walk_handle` and `worker_handles` when done.
///
/// `skip` lists files never reported (the checkpoint DB and its temp file); they are
/// canonicalized here when they exist.
pub fn run_scan(root: &Path, opts: &Opts, skip: &[PathBuf]) -> Result<pipeline::ScanHandles> {
    let root = check_root_and_canonicalize(root)?;
    let skip: Vec<PathBuf> = skip
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();
    let num_threads = capped_workers(None, WorkerThreadLimits::current().workers());
    debug!(
        "Scanning {} with {} metadata workers ({} walk)",
        root.display(),
        num_threads,
        if opts.parallel_scan { "parallel" } else { "serial" }
    );

    let channels = pipeline::create_scan_channels(&root, skip, opts);

    let walk_handle = pipeline::spawn_walk_thread(
        channels.path_tx,
        channels.path_count_tx,
        channels.ctx,
        opts.parallel_scan,
    );

    let worker_handles = pipeline::spawn_metadata_workers(
        channels.path_rx,
        &channels.entry_tx,
        &root,
        num_threads,
        opts.with_hash,
    );

    // Dropping the last sender closes the channel so workers exit.
    drop(channels.entry_tx);

    Ok(pipeline::ScanHandles {
        entry_rx: channels.entry_rx,
        path_count_rx: channels.path_count_rx,
        walk_handle,
        worker_handles,
        first_error: channels.first_error,
        skipped_paths: channels.skipped_paths,
    })
}

/// Shut down the scan by joining walk and worker threads (after stream is drained).
pub fn shutdown_scan_handles(
    walk_handle: std::thread::JoinHandle<usize>,
    worker_handles: Vec<std::thread::JoinHandle<()>>,
) -> Result<usize> {
    let count = walk_handle
        .join()
        .map_err(|_| anyhow::anyhow!("walk thread panicked"))?;
    for h in worker_handles {
        let _ = h.join();
    }
    Ok(count)
}

/// Scan `root` to completion: workspace-relative path -> fingerprint of every regular file.
/// Walk → path channel → workers (metadata) → entry channel → map.
pub fn collect_scan(
    root: &Path,
    opts: &Opts,
    skip: &[PathBuf],
) -> Result<BTreeMap<String, Fingerprint>> {
    let pipeline::ScanHandles {
        entry_rx,
        path_count_rx: _path_count_rx,
        walk_handle,
        worker_handles,
        first_error,
        skipped_paths,
    } = run_scan(root, opts, skip)?;

    let mut current = BTreeMap::new();
    while let Ok(entry) = entry_rx.recv() {
        current.insert(entry.path, entry.fingerprint);
    }
    let path_count = shutdown_scan_handles(walk_handle, worker_handles)?;
    debug!(
        "Scan done: {} paths walked, {} files fingerprinted",
        path_count,
        current.len()
    );

    pipeline::check_for_initial_error_or_skipped_paths(opts, &first_error, &skipped_paths)?;

    Ok(current)
}
