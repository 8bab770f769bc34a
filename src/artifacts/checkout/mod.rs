//! Working tree migrations
//!
//! A migration turns a change set between two trees into file writes,
//! deletions and index updates. Every path is checked for uncommitted local
//! edits first, and nothing is touched unless the whole migration is safe.
//!
//! - `conflict`: the kinds of stale-file refusal and their messages
//! - `migration`: planning and applying the change set

pub mod conflict;
pub mod migration;
