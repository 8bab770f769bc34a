//! Diff engine
//!
//! - `tree_diff`: which paths differ between two trees
//! - `diff_algorithm`: Myers' shortest edit script over lines
//! - `hunk`: grouping an edit script into context hunks, binary detection
//! - `diff_target`: one side of a file diff (HEAD, index, working tree, or nothing)

pub mod diff_algorithm;
pub mod diff_target;
pub mod hunk;
pub mod tree_diff;
