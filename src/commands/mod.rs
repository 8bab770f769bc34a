//! Command implementations
//!
//! Every command is an `impl Repository` block, split the usual way:
//!
//! - `plumbing`: object-level commands (cat-file, hash-object)
//! - `porcelain`: the version control workflow (add, commit, merge, reset, gc, ...)
//!
//! Porcelain commands that change anything take the repository lock for their
//! whole duration and print their user-facing output through the repository writer.

pub mod plumbing;
pub mod porcelain;
