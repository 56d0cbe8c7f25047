//! Job execution outside the core: transforms and the local worker pool.

pub mod transform;
pub mod worker;

pub use transform::{CopyTransform, Transform, TransformContext, TransformSet};
pub use worker::LocalRunner;
