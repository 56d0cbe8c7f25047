//! Command handlers for build and dry-run operations

use anyhow::Result;
use log::{info, warn};

use crate::Opts;
use crate::build::{BuildReport, build_dir};
use crate::check::check_dir;
use crate::utils::Colors;
use crate::utils::config::LIST_THRESHOLD;
use crate::utils::refinery_toml::BuilderConfig;

/// Handle a build: run it, then print the job log and failure summary.
pub fn handle_build(dir: &std::path::Path, opts: &Opts, builders: &[BuilderConfig]) -> Result<()> {
    let report = build_dir(dir, opts, builders)?;
    if opts.json {
        print_job_log_json(&report)?;
    }
    print_build_report(&report, opts.list);
    Ok(())
}

/// Handle a dry run.
pub fn handle_check(dir: &std::path::Path, opts: &Opts, builders: &[BuilderConfig]) -> Result<()> {
    check_dir(dir, opts, builders)?;
    Ok(())
}

/// One JSON object per job, in id order.
fn print_job_log_json(report: &BuildReport) -> Result<()> {
    for job in &report.jobs {
        println!("{}", serde_json::to_string(job)?);
    }
    Ok(())
}

fn print_build_report(report: &BuildReport, list: bool) {
    info!(
        "{} completed | {} | {} stale files removed",
        report.completed,
        Colors::failed(&format!("{} failed", report.failed)),
        report.garbage_removed
    );
    if report.failed == 0 {
        return;
    }
    if report.failed > LIST_THRESHOLD && !list {
        warn!(
            "{} failed jobs; rerun with --list to see all of them",
            report.failed
        );
        return;
    }
    for job in report.failed_jobs() {
        warn!(
            "{} [{}/{}]: {}",
            job.source_path,
            job.builder_id,
            job.platform,
            job.fail_reason.as_deref().unwrap_or("failed")
        );
    }
}
