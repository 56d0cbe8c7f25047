//! Pipeline components: scan (context, walk loop, metadata workers, error handling) and the
//! orchestrator loop that serializes work onto the asset pipeline.

pub mod context;
pub mod error_handler;
pub mod metadata;
pub mod orchestrator;
pub mod queue;
pub mod scan;
pub mod walk;

pub use context::{ScanChannels, ScanContext, ScanHandles, create_scan_channels};
pub use error_handler::check_for_initial_error_or_skipped_paths;
pub use metadata::spawn_metadata_workers;
pub use orchestrator::{Command, Orchestrator, RunResult};
pub use queue::EventQueue;
pub use scan::{collect_scan, run_scan, shutdown_scan_handles};
pub use walk::{WalkOutcome, run_walk_loop, spawn_walk_thread};
