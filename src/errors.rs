//! Repository error taxonomy
//!
//! Every fallible operation in the crate returns `anyhow::Result`. Failures that a
//! caller may want to react to are raised as a [`RepositoryError`] wrapped inside the
//! `anyhow::Error`, so they can be recovered with `downcast_ref`:
//!
//! ```rust,ignore
//! match repository.commit(&options).await {
//!     Err(err) if RepositoryError::is_lock_held(&err) => { /* abort */ }
//!     other => other?,
//! }
//! ```
//!
//! Merge conflicts are deliberately absent from this list: a conflicted merge,
//! cherry-pick or stash pop is reported through the operation's outcome value.

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Missing object, ref, revision or repository
    #[error("{0} not found")]
    NotFound(String),

    /// Compare-and-swap failure on a ref update
    #[error("ref {name} was updated concurrently: expected {expected}, found {actual}")]
    RefConflict {
        name: String,
        expected: String,
        actual: String,
    },

    /// Another process holds the repository lock
    #[error(
        "unable to create '{}': another twig process seems to be running in this repository",
        .0.display()
    )]
    LockHeld(PathBuf),

    /// Unresolved conflict entries remain in the index
    #[error("you have unmerged paths: {}", display_paths(.0))]
    DirtyMerge(Vec<PathBuf>),

    /// A merge or cherry-pick is waiting to be concluded
    #[error("a {0} is in progress; commit the resolution or abort it first")]
    MergeInProgress(String),

    /// Stored content no longer hashes to its key
    #[error("object {oid} is corrupt: content hashes to {actual}")]
    CorruptObject { oid: ObjectId, actual: String },

    /// Malformed request rejected before any mutation
    #[error("{0}")]
    Validation(String),
}

impl RepositoryError {
    pub fn not_found(what: impl Into<String>) -> anyhow::Error {
        RepositoryError::NotFound(what.into()).into()
    }

    pub fn validation(message: impl Into<String>) -> anyhow::Error {
        RepositoryError::Validation(message.into()).into()
    }

    pub fn classify(error: &anyhow::Error) -> Option<&RepositoryError> {
        error.downcast_ref::<RepositoryError>()
    }

    pub fn is_lock_held(error: &anyhow::Error) -> bool {
        matches!(Self::classify(error), Some(RepositoryError::LockHeld(_)))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RepositoryError::CorruptObject { .. })
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
