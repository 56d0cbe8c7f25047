//! Refinery CLI: build a project's assets; use --dry-run to see what would rebuild.

use anyhow::Result;
use clap::Parser;
use refinery::engine::arg_parser::Cli;
use refinery::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
