//! Builder registry: validated build rules, matched against source paths.

use log::debug;

use crate::engine::tools::{file_name, glob_match_icase};
use crate::error::ConfigError;
use crate::types::{BuilderDescriptor, PlatformScope, ProductOutputFlags};

/// Registered builders, in registration order.
///
/// Constructed at startup and shared by handle (`Arc<BuilderRegistry>`) with the pipeline, so
/// several independent pipelines can coexist.
#[derive(Debug, Default)]
pub struct BuilderRegistry {
    builders: Vec<BuilderDescriptor>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a builder.
    pub fn register(&mut self, descriptor: BuilderDescriptor) -> Result<(), ConfigError> {
        validate(&descriptor)?;
        if self.get(&descriptor.id).is_some() {
            return Err(ConfigError::DuplicateBuilder {
                builder: descriptor.id,
            });
        }
        debug!(
            "Registered builder '{}' {:?} {:?} priority {}",
            descriptor.id, descriptor.scope, descriptor.flags, descriptor.priority
        );
        self.builders.push(descriptor);
        Ok(())
    }

    /// Remove a builder by id. Returns the descriptor if it was registered.
    pub fn remove(&mut self, id: &str) -> Option<BuilderDescriptor> {
        let idx = self.builders.iter().position(|b| b.id == id)?;
        Some(self.builders.remove(idx))
    }

    pub fn get(&self, id: &str) -> Option<&BuilderDescriptor> {
        self.builders.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuilderDescriptor> {
        self.builders.iter()
    }

    /// Builders whose patterns match `path` (file name or full relative path, case-insensitive).
    /// Highest priority first; equal priorities keep registration order.
    pub fn match_builders(&self, path: &str) -> Vec<&BuilderDescriptor> {
        let name = file_name(path);
        let mut matched: Vec<&BuilderDescriptor> = self
            .builders
            .iter()
            .filter(|b| {
                b.patterns
                    .iter()
                    .any(|p| glob_match_icase(p, name) || glob_match_icase(p, path))
            })
            .collect();
        // sort_by is stable, so registration order breaks ties
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }
}

fn validate(d: &BuilderDescriptor) -> Result<(), ConfigError> {
    let product = d.flags.contains(ProductOutputFlags::PRODUCT_ASSET);
    let intermediate = d.flags.contains(ProductOutputFlags::INTERMEDIATE_ASSET);
    let builder = d.id.clone();
    match (product, intermediate) {
        (true, true) => return Err(ConfigError::BothOutputFlags { builder }),
        (false, false) => return Err(ConfigError::NoOutputFlag { builder }),
        (false, true) if d.scope == PlatformScope::PerPlatform => {
            return Err(ConfigError::IntermediatePerPlatform { builder });
        }
        _ => {}
    }
    if d.patterns.iter().all(|p| p.trim().is_empty()) {
        return Err(ConfigError::NoPatterns { builder });
    }
    Ok(())
}
