//! Refinery: incremental asset pipeline with a source/job/product dependency graph

pub mod build;
pub mod check;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use build::{BuildReport, build_dir};
pub use check::{CheckReport, check_dir};
pub use engine::core::{AssetPipeline, Completion, Notification, Outcome};
pub use engine::snapshot::GraphSnapshot;
pub use error::{ConfigError, ConflictError, CycleError, PipelineError};
pub use graph::DependencyGraph;
pub use registry::BuilderRegistry;

/// Result alias used by public refinery API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
