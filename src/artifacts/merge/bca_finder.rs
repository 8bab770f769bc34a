//! Best common ancestor (merge base) search
//!
//! ## Phase 1: common ancestors
//!
//! Both histories are walked at once, newest commit first. Each commit carries
//! flags saying which side reached it. A commit reached from both sides is a
//! common ancestor; everything below it is marked STALE, since anything reachable
//! from a common ancestor is a worse candidate than the ancestor itself.
//!
//! ## Phase 2: redundancy filter
//!
//! > A best common ancestor of X and Y is a common ancestor of X and Y that is not
//! > an ancestor of any other common ancestor.
//!
//! Candidates reachable from another candidate are dropped.
//!
//! ## Tie-break
//!
//! Criss-cross histories leave several best common ancestors. The one returned is
//! the first the frontier expansion reaches: the newest by committer timestamp,
//! then the smallest object id.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use bitflags::bitflags;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use tracing::debug;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const NONE = 0b0000;
        const VISITED_FROM_SOURCE = 0b0001;
        const VISITED_FROM_TARGET = 0b0010;
        const VISITED_FROM_BOTH = Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        const STALE = 0b0100;
        const RESULT = 0b1000;
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.contains(VisitState::VISITED_FROM_SOURCE) {
            flags.push("SOURCE");
        }
        if self.contains(VisitState::VISITED_FROM_TARGET) {
            flags.push("TARGET");
        }
        if self.contains(VisitState::STALE) {
            flags.push("STALE");
        }
        if self.contains(VisitState::RESULT) {
            flags.push("RESULT");
        }
        if flags.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

/// Merge base search over any commit source
///
/// The loader returns the parents and timestamp of a commit; the repository
/// passes [`Database::load_slim_commit`](crate::areas::database::Database::load_slim_commit),
/// tests pass an in-memory graph.
pub struct BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
}

impl<CommitLoaderFn> BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self { commit_loader }
    }

    /// Common ancestors of `source` and `target` not hidden below another one
    fn find_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> anyhow::Result<Vec<SlimCommit>> {
        let source_commit = (self.commit_loader)(source_commit_id)?;
        if source_commit_id == target_commit_id {
            return Ok(vec![source_commit]);
        }

        let mut ancestors_states = HashMap::<ObjectId, VisitState>::new();
        let mut commits = HashMap::<ObjectId, SlimCommit>::new();
        let mut priority_queue = BinaryHeap::<SlimCommit>::new();

        let target_commit = (self.commit_loader)(target_commit_id)?;
        ancestors_states.insert(source_commit.oid.clone(), VisitState::VISITED_FROM_SOURCE);
        ancestors_states.insert(target_commit.oid.clone(), VisitState::VISITED_FROM_TARGET);
        priority_queue.push(source_commit);
        priority_queue.push(target_commit);

        while let Some(commit) = priority_queue.pop() {
            // everything left is below a known common ancestor
            if priority_queue
                .iter()
                .chain(std::iter::once(&commit))
                .all(|queued| self.state_of(&ancestors_states, &queued.oid).contains(VisitState::STALE))
            {
                break;
            }

            let mut current_state = self.state_of(&ancestors_states, &commit.oid);

            if current_state.contains(VisitState::VISITED_FROM_BOTH)
                && !current_state.contains(VisitState::RESULT)
            {
                if !current_state.contains(VisitState::STALE) {
                    current_state |= VisitState::RESULT;
                    ancestors_states.insert(commit.oid.clone(), current_state);
                    debug!(oid = %commit.oid, "common ancestor found");
                }
                current_state |= VisitState::STALE;
            }

            let propagated = current_state - VisitState::RESULT;
            for parent_id in &commit.parents {
                let parent_state = self.state_of(&ancestors_states, parent_id);
                let new_state = parent_state | propagated;

                if new_state != parent_state {
                    ancestors_states.insert(parent_id.clone(), new_state);
                    priority_queue.push((self.commit_loader)(parent_id)?);
                }
            }

            commits.insert(commit.oid.clone(), commit);
        }

        Ok(ancestors_states
            .into_iter()
            .filter(|(_, state)| state.contains(VisitState::RESULT))
            .filter_map(|(oid, _)| commits.remove(&oid))
            .collect())
    }

    fn state_of(&self, states: &HashMap<ObjectId, VisitState>, oid: &ObjectId) -> VisitState {
        states.get(oid).copied().unwrap_or(VisitState::NONE)
    }

    /// Whether `ancestor` can be reached from `descendant` through parent links
    fn is_reachable(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        let mut visited = HashSet::new();
        let mut pending = vec![descendant.clone()];

        while let Some(oid) = pending.pop() {
            if &oid == ancestor {
                return Ok(true);
            }
            if visited.insert(oid.clone()) {
                pending.extend((self.commit_loader)(&oid)?.parents);
            }
        }

        Ok(false)
    }

    /// Every best common ancestor, first-found first
    pub fn find_best_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> anyhow::Result<Vec<ObjectId>> {
        let candidates = self.find_common_ancestors(source_commit_id, target_commit_id)?;

        let mut best = Vec::new();
        for candidate in &candidates {
            let mut redundant = false;
            for other in &candidates {
                if other.oid != candidate.oid && self.is_reachable(&candidate.oid, &other.oid)? {
                    redundant = true;
                    break;
                }
            }

            if !redundant {
                best.push(candidate.clone());
            }
        }

        best.sort_by(|a, b| b.cmp(a));
        Ok(best.into_iter().map(|commit| commit.oid).collect())
    }

    /// The merge base of two commits, or None for unrelated histories
    pub fn find_best_common_ancestor(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> anyhow::Result<Option<ObjectId>> {
        let best = self.find_best_common_ancestors(source_commit_id, target_commit_id)?;

        if best.len() > 1 {
            debug!(
                candidates = best.len(),
                chosen = %best[0],
                "several best common ancestors"
            );
        }

        Ok(best.into_iter().next())
    }
}
