//! First-writer-wins arbitration of output paths.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::debug;

use crate::error::ConflictError;
use crate::graph::{Claim, ClaimOwner, DependencyGraph};
use crate::types::{Fingerprint, ProductOutput, SourceId};

use super::tools::is_under_folder;

/// Tracks the losers of path conflicts so they can retry once the winner lets go.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    /// Sources whose output lost to the current holder of a claim.
    blocked: BTreeMap<Claim, BTreeSet<SourceId>>,
    /// Authored files that appeared at a logical path already held by an intermediate output.
    shadowed: BTreeMap<String, Fingerprint>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each output of one job must carry a distinct sub id.
    pub fn check_sub_ids(outputs: &[ProductOutput]) -> Result<(), ConflictError> {
        let mut seen = HashSet::new();
        for out in outputs {
            if !seen.insert(out.sub_id) {
                return Err(ConflictError::DuplicateSubId {
                    path: out.path.clone(),
                    sub_id: out.sub_id,
                });
            }
        }
        Ok(())
    }

    /// Check whether `owner` may take `claim`.
    ///
    /// Claims left behind by a source that no longer exists are free. The same source may
    /// re-claim through the builder that holds it; any other builder of that source conflicts.
    pub fn check_collision(
        graph: &DependencyGraph,
        claim: &Claim,
        owner: &ClaimOwner,
    ) -> Result<(), ConflictError> {
        let Some(current) = graph.claim_owner(claim) else {
            return Ok(());
        };
        if current.source == owner.source {
            return match &current.builder {
                Some(b) if Some(b) != owner.builder.as_ref() => {
                    Err(ConflictError::SameSourceOtherBuilder {
                        path: claim.describe(),
                        other_builder: b.clone(),
                    })
                }
                _ => Ok(()),
            };
        }
        let Some(occupant) = graph.source(current.source) else {
            return Ok(());
        };
        Err(ConflictError::PathClaimed {
            path: claim.describe(),
            occupant: occupant.path.clone(),
            occupant_id: occupant.id,
        })
    }

    /// Remember that `source` lost `claim`.
    pub fn block(&mut self, claim: Claim, source: SourceId) {
        debug!("{} blocked on {}", source, claim.describe());
        self.blocked.entry(claim).or_default().insert(source);
    }

    /// Sources waiting on `claim`, removed from the wait list.
    pub fn take_blocked(&mut self, claim: &Claim) -> Vec<SourceId> {
        self.blocked
            .remove(claim)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drop every wait entry of a deleted source.
    pub fn forget(&mut self, source: SourceId) {
        self.blocked.retain(|_, waiting| {
            waiting.remove(&source);
            !waiting.is_empty()
        });
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.values().map(BTreeSet::len).sum()
    }

    /// Park an authored file that arrived on an occupied logical path.
    pub fn shadow(&mut self, path: String, fingerprint: Fingerprint) {
        self.shadowed.insert(path, fingerprint);
    }

    pub fn unshadow(&mut self, path: &str) -> Option<Fingerprint> {
        self.shadowed.remove(path)
    }

    pub fn is_shadowed(&self, path: &str) -> bool {
        self.shadowed.contains_key(path)
    }

    /// Forget parked files below `folder`. Returns how many were dropped.
    pub fn unshadow_under(&mut self, folder: &str) -> usize {
        let before = self.shadowed.len();
        self.shadowed.retain(|p, _| !is_under_folder(p, folder));
        before - self.shadowed.len()
    }

    /// Parked authored files whose logical path is free again, removed from the parking list.
    pub fn take_unshadowed(&mut self, graph: &DependencyGraph) -> Vec<(String, Fingerprint)> {
        let free: Vec<String> = self
            .shadowed
            .keys()
            .filter(|p| {
                graph.claim_owner(&Claim::Source((*p).clone())).is_none()
                    && graph.source_by_path(p).is_none()
            })
            .cloned()
            .collect();
        free.into_iter()
            .filter_map(|p| self.shadowed.remove(&p).map(|fp| (p, fp)))
            .collect()
    }
}
