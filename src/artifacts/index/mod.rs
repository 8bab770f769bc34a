//! On-disk index format
//!
//! The index maps each staged path to a blob id plus the stat data used to
//! spot working tree changes cheaply. During a conflict a path holds up to
//! three entries, one per stage (base, ours, theirs), instead of one merged one.
//!
//! ```text
//! Header (12 bytes): "DIRC", version 2, entry count
//! Entries: stat fields, oid, flags (stage in bits 12-13, name length in the
//!          low 12 bits), NUL-terminated path, padded to 8 bytes
//! Checksum (20 bytes): SHA-1 of all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Length of the SHA-1 trailer
pub const CHECKSUM_SIZE: usize = 20;

/// Signature, version and entry count, four bytes each
pub const HEADER_SIZE: usize = 12;

pub const SIGNATURE: &str = "DIRC";

pub const VERSION: u32 = 2;
