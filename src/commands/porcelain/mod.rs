//! Porcelain commands
//!
//! The user-facing workflow, composed from the repository areas and the
//! algorithms under `artifacts`.
//!
//! ## Commands
//!
//! - `init`: create an empty repository
//! - `add` / `unstage`: stage or untrack working tree files
//! - `commit`: record the index as a new commit, concluding a pending merge
//! - `status`: HEAD, index and working tree compared
//! - `diff`: unstaged or staged changes as hunks
//! - `log`: history of HEAD, newest first
//! - `branch` / `tag`: create, list and delete refs
//! - `checkout`: switch branches or detach HEAD
//! - `merge` / `cherry-pick`: three-way merges against the current HEAD
//! - `stash`: shelve and re-apply local changes
//! - `reset`: move HEAD with soft, mixed or hard severity
//! - `gc`: delete objects no root can reach

pub mod add;
pub mod branch;
pub mod checkout;
pub mod cherry_pick;
pub mod commit;
pub mod diff;
pub mod gc;
pub mod init;
pub mod log;
pub mod merge;
pub mod reset;
pub mod stash;
pub mod status;
pub mod tag;
