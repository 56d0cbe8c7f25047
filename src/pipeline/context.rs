//! Scan context: shared data passed into the walk thread and the metadata workers.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::Opts;
use crate::types::ScanEntry;
use crate::utils::config::{PackagePaths, SCAN_CHANNEL_CAP};

/// Shared context for the walk + metadata scan. Built in `run_scan` and passed into the walk
/// thread so the common walk loop has root, exclude, strict, and error/skip state.
pub struct ScanContext {
    pub root: PathBuf,
    /// Canonical paths never scanned (checkpoint DB and its temp file).
    pub skip: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub strict: bool,
    pub follow_links: bool,
    pub first_error: Arc<Mutex<Option<String>>>,
    pub skipped_paths: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

/// Handles returned by `run_scan`: receive entries and join when done.
/// `path_count_rx` receives the walk's path count when the walk finishes.
pub struct ScanHandles {
    pub entry_rx: Receiver<ScanEntry>,
    pub path_count_rx: Receiver<usize>,
    pub walk_handle: JoinHandle<usize>,
    pub worker_handles: Vec<JoinHandle<()>>,
    pub first_error: Arc<Mutex<Option<String>>>,
    pub skipped_paths: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

/// Channels and shared state for the scan. Walk thread gets path_tx, path_count_tx, ctx; workers get path_rx, entry_tx.
pub struct ScanChannels {
    pub path_tx: Sender<PathBuf>,
    pub path_rx: Receiver<PathBuf>,
    pub entry_tx: Sender<ScanEntry>,
    pub entry_rx: Receiver<ScanEntry>,
    pub path_count_tx: Sender<usize>,
    pub path_count_rx: Receiver<usize>,
    pub first_error: Arc<Mutex<Option<String>>>,
    pub skipped_paths: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub ctx: ScanContext,
}

pub fn create_scan_channels(root: &Path, skip: Vec<PathBuf>, opts: &Opts) -> ScanChannels {
    let (path_tx, path_rx) = bounded::<PathBuf>(SCAN_CHANNEL_CAP);
    let (entry_tx, entry_rx) = bounded::<ScanEntry>(SCAN_CHANNEL_CAP);
    let (path_count_tx, path_count_rx) = bounded::<usize>(1);
    let first_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let skipped_paths: Arc<Mutex<Vec<(PathBuf, String)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut exclude = PackagePaths::get().default_exclude_patterns();
    exclude.extend(opts.exclude.iter().cloned());

    let ctx = ScanContext {
        root: root.to_path_buf(),
        skip,
        exclude,
        strict: opts.strict,
        follow_links: opts.follow_links,
        first_error: Arc::clone(&first_error),
        skipped_paths: Arc::clone(&skipped_paths),
    };

    ScanChannels {
        path_tx,
        path_rx,
        entry_tx,
        entry_rx,
        path_count_tx,
        path_count_rx,
        first_error,
        skipped_paths,
        ctx,
    }
}
