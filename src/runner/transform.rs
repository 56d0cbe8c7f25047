//! Transforms: the code a builder runs for one job.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::hashing::fingerprint_file;
use crate::engine::tools::replace_extension;
use crate::types::{JobDetails, ProductOutput};
use crate::utils::refinery_toml::BuilderConfig;

/// Inputs of one transform run.
pub struct TransformContext<'a> {
    pub job: &'a JobDetails,
    /// Absolute path of the input file.
    pub input: PathBuf,
    /// Absolute folder outputs are written below (platform or intermediate root).
    pub output_root: PathBuf,
    /// Fingerprint outputs by content rather than mtime+size, matching the scan.
    pub with_hash: bool,
}

/// Work done for a builder. Returned paths are relative to `output_root`.
pub trait Transform: Send + Sync {
    fn run(&self, ctx: &TransformContext<'_>) -> Result<Vec<ProductOutput>>;
}

/// Copies the input under the output root, swapping the extension.
#[derive(Debug, Clone)]
pub struct CopyTransform {
    pub extension: String,
}

impl CopyTransform {
    pub fn new(extension: impl Into<String>) -> Self {
        CopyTransform {
            extension: extension.into(),
        }
    }
}

impl Transform for CopyTransform {
    fn run(&self, ctx: &TransformContext<'_>) -> Result<Vec<ProductOutput>> {
        let bytes = std::fs::read(&ctx.input)
            .with_context(|| format!("read {}", ctx.input.display()))?;
        let rel = replace_extension(&ctx.job.source_path, &self.extension);
        let out = ctx.output_root.join(&rel);
        write_if_changed(&out, &bytes)?;
        Ok(vec![ProductOutput::new(
            rel,
            0,
            fingerprint_file(&out, ctx.with_hash)?,
        )])
    }
}

/// Leave an identical file untouched so its mtime (and mtime-based fingerprint) survives.
fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Ok(existing) = std::fs::read(path)
        && existing == bytes
    {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

/// Transform for each builder id.
#[derive(Default, Clone)]
pub struct TransformSet {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One copy transform per configured builder.
    pub fn from_builders(builders: &[BuilderConfig]) -> Self {
        let mut set = Self::new();
        for b in builders {
            set.insert(&b.descriptor.id, Arc::new(CopyTransform::new(&b.extension)));
        }
        set
    }

    pub fn insert(&mut self, builder_id: &str, transform: Arc<dyn Transform>) {
        self.transforms.insert(builder_id.to_string(), transform);
    }

    pub fn get(&self, builder_id: &str) -> Option<&Arc<dyn Transform>> {
        self.transforms.get(builder_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fingerprint, JobId, JobStatus, SourceId};

    fn job(source_path: &str) -> JobDetails {
        JobDetails {
            id: JobId(1),
            source_id: SourceId::new(),
            source_path: source_path.to_string(),
            input_path: source_path.to_string(),
            builder_id: "copy".to_string(),
            builder_version: 1,
            platform: "pc".to_string(),
            intermediate: false,
            auto_fail: false,
            fail_reason: None,
            input_fingerprint: Fingerprint::of_bytes(b""),
            upstream: Vec::new(),
            status: JobStatus::Processing,
            pass: 1,
            forced: false,
        }
    }

    #[test]
    fn copy_swaps_extension_and_keeps_identical_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.stage1");
        std::fs::write(&input, b"payload").unwrap();
        let job = job("sub/a.stage1");
        let ctx = TransformContext {
            job: &job,
            input,
            output_root: dir.path().join("out"),
            with_hash: true,
        };
        let t = CopyTransform::new("stage2");
        let first = t.run(&ctx).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].path, "sub/a.stage2");
        assert_eq!(first[0].fingerprint, Fingerprint::of_bytes(b"payload"));
        let out = dir.path().join("out/sub/a.stage2");
        let mtime = std::fs::metadata(&out).unwrap().modified().unwrap();

        let second = t.run(&ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::metadata(&out).unwrap().modified().unwrap(), mtime);
    }
}
