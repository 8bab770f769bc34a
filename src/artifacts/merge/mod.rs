//! Three-way merge machinery shared by merge, cherry-pick and stash pop
//!
//! - `bca_finder`: merge base of two commits
//! - `resolution`: per-path classification of base/ours/theirs
//! - `merge_state`: the on-disk record of a conflicted merge or cherry-pick

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;

pub mod bca_finder;
pub mod merge_state;
pub mod resolution;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The incoming commit is already part of our history
    AlreadyUpToDate,
    /// Our tip was an ancestor; the ref moved without a new commit
    FastForward(ObjectId),
    /// A two-parent merge commit was created
    Merged(ObjectId),
    /// Conflicted paths were left for manual resolution
    Conflicted(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Picked(ObjectId),
    Conflicted(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashPopOutcome {
    /// The stash applied cleanly and was dropped
    Applied(ObjectId),
    /// The stash stays on the stack until the conflicts are dealt with
    Conflicted(Vec<PathBuf>),
}

impl MergeOutcome {
    pub fn conflicts(&self) -> &[PathBuf] {
        match self {
            MergeOutcome::Conflicted(paths) => paths,
            _ => &[],
        }
    }
}
