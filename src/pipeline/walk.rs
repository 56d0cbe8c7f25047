//! Directory walk feeding the metadata workers.
//!
//! Both walkers yield entries sorted by file name, so the scan order (and with it the order in
//! which same-batch conflicts are decided) is stable across runs.

use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::tools::should_include_in_walk;

use super::context::ScanContext;

/// One walk step: a path to consider, or an error with the path it concerns when known.
pub enum WalkOutcome {
    Ok(PathBuf),
    Err { msg: String, path: Option<PathBuf> },
}

impl From<Result<jwalk::DirEntry<((), ())>, jwalk::Error>> for WalkOutcome {
    fn from(r: Result<jwalk::DirEntry<((), ())>, jwalk::Error>) -> Self {
        match r {
            Ok(entry) => WalkOutcome::Ok(entry.path().to_path_buf()),
            Err(err) => WalkOutcome::Err {
                path: err.path().map(PathBuf::from),
                msg: err.to_string(),
            },
        }
    }
}

impl From<Result<walkdir::DirEntry, walkdir::Error>> for WalkOutcome {
    fn from(r: Result<walkdir::DirEntry, walkdir::Error>) -> Self {
        match r {
            Ok(entry) => WalkOutcome::Ok(entry.into_path()),
            Err(err) => WalkOutcome::Err {
                path: err.path().map(PathBuf::from),
                msg: err.to_string(),
            },
        }
    }
}

type Steps = Box<dyn Iterator<Item = WalkOutcome>>;

/// jwalk on the rayon pool.
fn parallel_steps(ctx: &ScanContext) -> Steps {
    let walk = jwalk::WalkDir::new(&ctx.root)
        .follow_links(ctx.follow_links)
        .skip_hidden(false)
        .sort(true)
        .parallelism(jwalk::Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_secs(60),
        });
    Box::new(walk.into_iter().map(WalkOutcome::from))
}

/// walkdir on the calling thread. Excluded folders are not descended into.
fn serial_steps(ctx: &ScanContext) -> Steps {
    let root = ctx.root.clone();
    let skip = ctx.skip.clone();
    let exclude = ctx.exclude.clone();
    let walk = walkdir::WalkDir::new(&ctx.root)
        .follow_links(ctx.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0 || should_include_in_walk(e.path(), &root, &skip, &exclude)
        });
    Box::new(walk.map(WalkOutcome::from))
}

pub fn spawn_walk_thread(
    path_tx: Sender<PathBuf>,
    path_count_tx: Sender<usize>,
    ctx: ScanContext,
    parallel_walk: bool,
) -> JoinHandle<usize> {
    thread::spawn(move || {
        let steps = if parallel_walk {
            parallel_steps(&ctx)
        } else {
            serial_steps(&ctx)
        };
        run_walk_loop(path_tx, path_count_tx, ctx, steps)
    })
}

/// Send every included path to `path_tx`. Errors stop the walk in strict mode (first error kept),
/// otherwise the path is recorded as skipped. Sends the count on `path_count_tx` and returns it.
pub fn run_walk_loop<I>(
    path_tx: Sender<PathBuf>,
    path_count_tx: Sender<usize>,
    ctx: ScanContext,
    steps: I,
) -> usize
where
    I: Iterator<Item = WalkOutcome>,
{
    let mut sent = 0_usize;
    let mut last_seen: Option<PathBuf> = None;
    for step in steps {
        let (msg, path) = match step {
            WalkOutcome::Ok(path) => {
                if !should_include_in_walk(&path, &ctx.root, &ctx.skip, &ctx.exclude) {
                    continue;
                }
                last_seen = Some(path.clone());
                if path_tx.send(path).is_err() {
                    break;
                }
                sent += 1;
                continue;
            }
            WalkOutcome::Err { msg, path } => (msg, path),
        };
        if ctx.strict {
            if let Ok(mut first) = ctx.first_error.lock() {
                first.get_or_insert(msg);
            }
            break;
        }
        let path = path.unwrap_or_else(|| match &last_seen {
            Some(p) => PathBuf::from(format!("<unknown, after {}>", p.display())),
            None => PathBuf::from("<unknown>"),
        });
        if let Ok(mut skipped) = ctx.skipped_paths.lock() {
            skipped.push((path, msg));
        }
    }
    let _ = path_count_tx.send(sent);
    sent
}
