use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crate::engine::hashing::fingerprint_file;
use crate::engine::tools::{path_relative_to, path_to_db_string};
use crate::types::ScanEntry;

/// Single metadata worker: read paths from path_rx, fingerprint regular files, send on entry_tx.
fn metadata_worker_loop(
    path_rx: Receiver<PathBuf>,
    entry_tx: Sender<ScanEntry>,
    root: PathBuf,
    with_hash: bool,
) {
    while let Ok(abs_path) = path_rx.recv() {
        match path_to_entry(&abs_path, &root, with_hash) {
            Ok(Some(entry)) => {
                let _ = entry_tx.send(entry);
            }
            Ok(None) => {}
            Err(e) => debug!("{}: {e:#}", abs_path.display()),
        }
    }
    drop(entry_tx);
}

/// Spawn metadata workers. Caller must drop its sender after this so workers exit.
pub fn spawn_metadata_workers(
    path_rx: Receiver<PathBuf>,
    entry_tx: &Sender<ScanEntry>,
    root: &Path,
    num_threads: usize,
    with_hash: bool,
) -> Vec<JoinHandle<()>> {
    let root = root.to_path_buf();
    (0..num_threads)
        .map(|_| {
            let path_rx = path_rx.clone();
            let entry_tx = entry_tx.clone();
            let root = root.clone();
            thread::spawn(move || metadata_worker_loop(path_rx, entry_tx, root, with_hash))
        })
        .collect()
}

/// Fingerprint one path. Directories and other non-files yield `None`.
fn path_to_entry(abs_path: &Path, root: &Path, with_hash: bool) -> anyhow::Result<Option<ScanEntry>> {
    let meta = std::fs::metadata(abs_path)?;
    if !meta.is_file() {
        return Ok(None);
    }
    let rel = path_relative_to(abs_path, root).unwrap_or_else(|| abs_path.to_path_buf());
    Ok(Some(ScanEntry {
        path: path_to_db_string(&rel),
        fingerprint: fingerprint_file(abs_path, with_hash)?,
    }))
}
