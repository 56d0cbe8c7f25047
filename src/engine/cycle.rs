//! Cycle detection for intermediate outputs.

use crate::error::CycleError;
use crate::graph::DependencyGraph;
use crate::types::SourceId;

pub struct CycleDetector;

impl CycleDetector {
    /// Reject `candidate` if it names `source` or any of its ancestors.
    ///
    /// Walks produced-by links upward from the emitting source, so the cost is the chain depth.
    pub fn check_chain(
        graph: &DependencyGraph,
        candidate: &str,
        source: SourceId,
    ) -> Result<(), CycleError> {
        let ancestors = graph.ancestors(source);
        let hit = ancestors
            .iter()
            .filter_map(|id| graph.source(*id))
            .any(|s| s.path == candidate);
        if !hit {
            return Ok(());
        }
        let chain = ancestors
            .iter()
            .rev()
            .filter_map(|id| graph.source(*id))
            .map(|s| s.path.clone())
            .collect();
        Err(CycleError {
            path: candidate.to_string(),
            chain,
        })
    }
}
