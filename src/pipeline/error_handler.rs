use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::Opts;

/// Check scan result: if strict and a first error was recorded, return it; otherwise log skipped paths.
/// Call after joining walk and workers.
pub fn check_for_initial_error_or_skipped_paths(
    opts: &Opts,
    first_error: &Arc<Mutex<Option<String>>>,
    skipped_paths: &Arc<Mutex<Vec<(PathBuf, String)>>>,
) -> Result<()> {
    if opts.strict
        && let Some(msg) = first_error.lock().ok().and_then(|mut e| e.take())
    {
        return Err(anyhow::anyhow!("{}", msg));
    }
    let Ok(skipped) = skipped_paths.lock() else {
        return Ok(());
    };
    if !skipped.is_empty() && !opts.strict {
        log::warn!(
            "Skipped {} paths due to permission errors or access issues",
            skipped.len()
        );
        if opts.verbose {
            for (p, msg) in skipped.iter() {
                eprintln!("  skipped: {} ({msg})", p.display());
            }
        }
    }
    Ok(())
}
