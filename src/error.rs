//! Error taxonomy for builder registration, chain validation and the job protocol.

use crate::types::{JobId, SourceId};

/// Invalid builder registration. Rejects only that builder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Builder '{builder}' declares both ProductAsset and IntermediateAsset outputs")]
    BothOutputFlags { builder: String },

    #[error("Builder '{builder}' declares neither ProductAsset nor IntermediateAsset output")]
    NoOutputFlag { builder: String },

    #[error("Builder '{builder}' emits IntermediateAsset outputs but is PerPlatform; intermediates must be Common")]
    IntermediatePerPlatform { builder: String },

    #[error("Builder '{builder}' is already registered")]
    DuplicateBuilder { builder: String },

    #[error("Builder '{builder}' has no match patterns")]
    NoPatterns { builder: String },
}

/// A build chain would loop back onto one of its own ancestors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "An output loop has been detected. '{path}' has already been output as an intermediate in the processing chain ({})",
    chain.join(" -> ")
)]
pub struct CycleError {
    /// The intermediate output that closes the loop.
    pub path: String,
    /// Ancestor paths from the top-level source down to the emitting source.
    pub chain: Vec<String>,
}

/// Two chains claim the same output path. The later arrival loses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error(
        "'{path}' is already owned by '{occupant}'. Please move/rename one of the files to fix the conflict"
    )]
    PathClaimed {
        path: String,
        occupant: String,
        occupant_id: SourceId,
    },

    #[error(
        "Builder '{other_builder}' is also outputting '{path}' for the same source. The same product must not be output by more than one builder"
    )]
    SameSourceOtherBuilder { path: String, other_builder: String },

    #[error("More than one product was emitted with SubID {sub_id} ('{path}'). Each output of a job needs a unique SubID")]
    DuplicateSubId { path: String, sub_id: u32 },
}

/// Misuse of the job protocol by a runner, or a registration error surfaced through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown job {0}")]
    UnknownJob(JobId),

    #[error("Job {0} was never dispatched")]
    NotDispatched(JobId),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
