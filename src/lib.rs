//! twig: a local version control engine
//!
//! - `areas`: the stateful parts of a repository (object store, index, refs, working tree, lock)
//! - `artifacts`: object model, diffing, merging and history algorithms
//! - `commands`: plumbing and porcelain operations on a [`areas::repository::Repository`]
//! - `errors`: the typed failures callers can match on

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod errors;
