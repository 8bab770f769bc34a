//! Data structures and algorithms
//!
//! - `branch`: ref names and revision parsing
//! - `checkout`: working tree migrations and stale-file detection
//! - `core`: the pager writer used by `log`
//! - `database`: tree entries as stored in the object store
//! - `diff`: tree diffs, Myers line diff and hunks
//! - `index`: on-disk index entries and header
//! - `log`: history walks and reachability
//! - `objects`: blob, tree, commit and tag
//! - `status`: HEAD, index and working tree comparison
//! - `merge`: merge base, three-way resolution and pending merge state

pub mod branch;
pub mod checkout;
pub mod core;
pub mod database;
pub mod diff;
pub mod index;
pub mod log;
pub mod merge;
pub mod objects;
pub mod status;
