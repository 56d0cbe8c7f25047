//! Engine: the asset pipeline core, its components, persistence and the CLI plumbing around it

pub mod arg_parser;
pub mod classifier;
pub mod cli;
pub mod conflict;
pub mod core;
pub mod cycle;
pub mod db_ops;
pub mod handlers;
pub mod hashing;
pub mod incremental;
pub mod jobs;
pub mod lifecycle;
pub mod progress;
pub mod snapshot;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use classifier::{Classification, SourceFileClassifier};
pub use cli::handle_run;
pub use conflict::ConflictResolver;
pub use core::{AssetPipeline, Completion, Listener, Notification, Outcome};
pub use cycle::CycleDetector;
pub use db_ops::{load_snapshot, open_db, open_db_in_memory, save_snapshot};
pub use hashing::{fingerprint_file, hash_file};
pub use incremental::{FingerprintKey, IncrementalScheduler};
pub use jobs::{IdAllocator, JobGenerator};
pub use lifecycle::{ProductLifecycleManager, Removal};
pub use snapshot::GraphSnapshot;
pub use tools::path_relative_to;
