//! Iterative traversals over dependency edges.

use std::collections::{HashSet, VecDeque};

use crate::types::SourceId;

use super::DependencyGraph;

impl DependencyGraph {
    /// The parent source of a synthetic source (source of the job that produced it).
    pub fn parent_of(&self, id: SourceId) -> Option<SourceId> {
        let job = self.source(id)?.produced_by?;
        self.job(job).map(|j| j.source_id)
    }

    /// `id` and its ancestors, nearest first, ending at the top-level authored source.
    ///
    /// Panics if the walk revisits a source: the graph must be acyclic once committed.
    pub fn ancestors(&self, id: SourceId) -> Vec<SourceId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(id);
        while let Some(s) = cur {
            if !self.contains_source(s) {
                break;
            }
            if !seen.insert(s) {
                panic!("dependency cycle committed to the graph at source {s}");
            }
            chain.push(s);
            cur = self.parent_of(s);
        }
        chain
    }

    /// Top-level (authored) ancestor of `id`, or `id` itself.
    pub fn top_level(&self, id: SourceId) -> SourceId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Synthetic sources directly produced from `id`'s committed products.
    pub fn children_of(&self, id: SourceId) -> Vec<SourceId> {
        self.products_of_source(id)
            .into_iter()
            .filter_map(|p| p.intermediate_source)
            .filter(|s| self.contains_source(*s))
            .collect()
    }

    /// All sources reachable downstream of `id` (breadth-first, `id` excluded).
    pub fn descendants(&self, id: SourceId) -> Vec<SourceId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue: VecDeque<SourceId> = VecDeque::from([id]);
        while let Some(s) = queue.pop_front() {
            for child in self.children_of(s) {
                if seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }
}
