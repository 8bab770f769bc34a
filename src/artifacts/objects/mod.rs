//! Object types and operations
//!
//! All content is stored as objects identified by SHA-1 hashes. There are four kinds:
//!
//! - **Blob**: File content (raw bytes)
//! - **Tree**: Directory listing (names, modes, and object IDs)
//! - **Commit**: Snapshot with metadata (author, message, parent commits, tree)
//! - **Tag**: Annotated reference to another object
//!
//! Every object is framed as `<type> <size>\0<content>` before hashing and storage.

pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tag;
pub mod tree;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;
