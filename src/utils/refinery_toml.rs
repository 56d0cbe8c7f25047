//! Load `.refinery.toml` from a project directory: `[settings]` and `[[builder]]` tables.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::types::{BuilderDescriptor, PlatformScope, ProductOutputFlags};
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct RefineryToml {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default, rename = "builder")]
    builders: Vec<BuilderSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    db_path: Option<String>,
    platforms: Option<Vec<String>>,
    cache_root: Option<String>,
    hash: Option<bool>,
    follow_links: Option<bool>,
    exclude: Option<Vec<String>>,
    verbose: Option<bool>,
    strict: Option<bool>,
    parallel_scan: Option<bool>,
    workers: Option<usize>,
    max_path_len: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutputKind {
    Product,
    Intermediate,
}

#[derive(Debug, Deserialize)]
struct BuilderSection {
    id: String,
    patterns: Vec<String>,
    #[serde(default = "default_scope")]
    scope: PlatformScope,
    output: OutputKind,
    #[serde(default)]
    priority: i32,
    #[serde(default = "default_version")]
    version: u32,
    /// Extension given to outputs of the copy transform.
    extension: String,
}

fn default_scope() -> PlatformScope {
    PlatformScope::Common
}

fn default_version() -> u32 {
    1
}

/// A builder declared in the project file, with the parameters of its transform.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub descriptor: BuilderDescriptor,
    pub extension: String,
}

impl RefineryToml {
    /// Parse a config document.
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Builders in declaration order. Validation happens at registration.
    pub fn builders(&self) -> Vec<BuilderConfig> {
        self.builders
            .iter()
            .map(|b| {
                let flags = match b.output {
                    OutputKind::Product => ProductOutputFlags::PRODUCT_ASSET,
                    OutputKind::Intermediate => ProductOutputFlags::INTERMEDIATE_ASSET,
                };
                let patterns: Vec<&str> = b.patterns.iter().map(String::as_str).collect();
                BuilderConfig {
                    descriptor: BuilderDescriptor::new(b.id.clone(), &patterns, b.scope, flags)
                        .with_priority(b.priority)
                        .with_version(b.version),
                    extension: b.extension.clone(),
                }
            })
            .collect()
    }
}

/// Load `.refinery.toml` from `dir` if present. Returns None if file missing or unreadable.
pub fn load_refinery_toml(dir: &Path) -> Option<RefineryToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    RefineryToml::parse(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $sec.$sec_field.clone() {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Apply file config to opts (only set fields present in the file). Call before applying CLI. dry_run is never in the file.
pub fn apply_file_to_opts(file: &RefineryToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(ref p) = s.db_path {
        opts.db_path = Some(PathBuf::from(p));
    }
    apply_file_opt!(s, opts, platforms => pipeline.platforms);
    apply_file_opt!(s, opts, cache_root => pipeline.cache_root);
    apply_file_opt!(s, opts, max_path_len => pipeline.max_path_len);
    apply_file_opt!(s, opts, hash => with_hash);
    apply_file_opt!(s, opts, follow_links => follow_links);
    apply_file_opt!(s, opts, exclude => exclude);
    apply_file_opt!(s, opts, verbose => verbose);
    apply_file_opt!(s, opts, strict => strict);
    apply_file_opt!(s, opts, parallel_scan => parallel_scan);
    if s.workers.is_some() {
        opts.workers = s.workers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_and_builders_parse() {
        let doc = r#"
            [settings]
            platforms = ["pc", "linux"]
            hash = true

            [[builder]]
            id = "stage1"
            patterns = ["*.stage1"]
            output = "intermediate"
            extension = "stage2"

            [[builder]]
            id = "stage2"
            patterns = ["*.stage2"]
            scope = "per_platform"
            output = "product"
            priority = 5
            extension = "stage3"
        "#;
        let file = RefineryToml::parse(doc).unwrap();
        let mut opts = Opts::default();
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.pipeline.platforms, vec!["pc", "linux"]);
        assert!(opts.with_hash);

        let builders = file.builders();
        assert_eq!(builders.len(), 2);
        assert!(builders[0].descriptor.is_intermediate());
        assert_eq!(builders[0].descriptor.scope, PlatformScope::Common);
        assert_eq!(builders[1].descriptor.scope, PlatformScope::PerPlatform);
        assert_eq!(builders[1].descriptor.priority, 5);
        assert_eq!(builders[1].extension, "stage3");
    }
}
