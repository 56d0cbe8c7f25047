//! Console logging: env_logger with a colored `[refinery]` prefix.

use colored::{ColoredString, Colorize};
use env_logger::Builder;
use log::{Level, LevelFilter, Record};
use std::io::Write;

/// Warnings and errors carry their level and module so build failures can be traced to a stage.
fn render(record: &Record<'_>) -> String {
    let name = env!("CARGO_PKG_NAME").cyan();
    let tag = match record.level() {
        Level::Error => "ERROR".red(),
        Level::Warn => "WARN".yellow(),
        _ => return format!("[{name}] {}", record.args()),
    };
    format!(
        "[{name} {tag} {}] {}",
        record.target().white(),
        record.args()
    )
}

/// Install the logger once. `RUST_LOG` still applies to dependencies; this crate logs at Info,
/// or Debug when verbose.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| writeln!(buf, "{}", render(record)))
        .try_init()
        .ok();
}

/// Colors for change and job summaries.
pub struct Colors;

impl Colors {
    pub fn added(s: &str) -> ColoredString {
        s.green()
    }

    pub fn removed(s: &str) -> ColoredString {
        s.red()
    }

    pub fn modified(s: &str) -> ColoredString {
        s.yellow()
    }

    pub fn failed(s: &str) -> ColoredString {
        s.red().bold()
    }
}
