//! Classify incoming paths as authored sources, synthetic (intermediate) sources, or products.

use crate::graph::DependencyGraph;
use crate::types::PipelineConfig;

use super::tools::{normalize_rel, strip_root};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Written by a person; carries the logical relative path.
    Authored(String),
    /// Synthesized by a build step; carries the logical path (intermediate root stripped).
    Synthetic(String),
    /// A build output in the per-platform product tree.
    Product { platform: String, path: String },
}

impl Classification {
    /// Logical path for sources, `platform/path` for products.
    pub fn logical(&self) -> String {
        match self {
            Classification::Authored(p) | Classification::Synthetic(p) => p.clone(),
            Classification::Product { platform, path } => format!("{platform}/{path}"),
        }
    }
}

/// Pure function of the current graph state.
pub struct SourceFileClassifier<'a> {
    config: &'a PipelineConfig,
    graph: &'a DependencyGraph,
}

impl<'a> SourceFileClassifier<'a> {
    pub fn new(config: &'a PipelineConfig, graph: &'a DependencyGraph) -> Self {
        Self { config, graph }
    }

    /// Classify a workspace-relative (or logical) path.
    pub fn classify(&self, path: &str) -> Classification {
        let path = normalize_rel(path);
        if let Some(rel) = strip_root(&path, &self.config.intermediate_root()) {
            return Classification::Synthetic(rel.to_string());
        }
        if let Some(rest) = strip_root(&path, &self.config.cache_root) {
            let (platform, rel) = rest.split_once('/').unwrap_or((rest, ""));
            return Classification::Product {
                platform: platform.to_string(),
                path: rel.to_string(),
            };
        }
        match self.graph.source_by_path(&path) {
            Some(source) if source.produced_by.is_some() => Classification::Synthetic(path),
            _ => Classification::Authored(path),
        }
    }

    /// True when `path` physically lies in the intermediate tree (as opposed to naming a synthetic source logically).
    pub fn is_intermediate_location(&self, path: &str) -> bool {
        strip_root(&normalize_rel(path), &self.config.intermediate_root()).is_some()
    }
}
