//! Stateful parts of a repository
//!
//! - `database`: loose object store
//! - `index`: staging area, stage-aware during conflicts
//! - `refs`: branches, tags and HEAD, updated by compare-and-swap
//! - `workspace`: the working tree on disk
//! - `lock`: repository lock and single-file lockfiles
//! - `repository`: the handle tying all of the above together

pub mod database;
pub mod index;
pub mod lock;
pub mod refs;
pub mod repository;
pub mod workspace;
