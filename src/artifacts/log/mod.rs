//! Commit graph traversal
//!
//! - `rev_list`: lazy newest-first ancestor walk, ancestry test
//! - `reachability`: transitive closure over commits, trees, blobs and tags

pub mod reachability;
pub mod rev_list;
