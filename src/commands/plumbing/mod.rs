//! Plumbing commands
//!
//! Direct access to the object store, mostly useful for scripting and debugging.
//!
//! ## Commands
//!
//! - `cat-file`: pretty-print a stored object
//! - `hash-object`: compute a file's blob id and optionally store it

pub mod cat_file;
pub mod hash_object;
