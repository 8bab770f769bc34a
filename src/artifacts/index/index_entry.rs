//! Index entry representation
//!
//! Each entry in the index tracks one path at one merge stage:
//! - File path
//! - Content hash (object ID)
//! - File metadata (mode, size, timestamps)
//! - Stage (0 when merged, 1/2/3 for base/ours/theirs during a conflict)
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format with 8-byte alignment. The 16-bit flags
//! field carries the stage in bits 12-13 and the path length in the low 12 bits.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::anyhow;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::{BufRead, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

/// Maximum path length representable in the flags field
const MAX_PATH_SIZE: usize = 0xFFF;

const STAGE_SHIFT: u16 = 12;
const STAGE_MASK: u16 = 0x3000;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Minimum size of an index entry in bytes
pub const ENTRY_MIN_SIZE: usize = 64;

/// Merge stage of an index entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    #[default]
    Merged = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub const CONFLICT_STAGES: [Stage; 3] = [Stage::Base, Stage::Ours, Stage::Theirs];

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn is_conflict(&self) -> bool {
        *self != Stage::Merged
    }
}

impl TryFrom<u16> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> anyhow::Result<Self> {
        match value {
            0 => Ok(Stage::Merged),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(anyhow!("invalid index stage {value}")),
        }
    }
}

/// Index entry representing a tracked path at one stage
#[derive(Debug, Clone, new)]
pub struct IndexEntry {
    /// File path relative to repository root
    pub name: PathBuf,
    /// Object ID of the staged blob
    pub oid: ObjectId,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
    #[new(default)]
    pub stage: Stage,
}

impl IndexEntry {
    /// Entry for a conflict stage, carrying only what a tree entry carries
    pub fn conflicted(name: PathBuf, entry: &DatabaseEntry, stage: Stage) -> Self {
        IndexEntry {
            name,
            oid: entry.oid.clone(),
            metadata: EntryMetadata {
                mode: entry.mode,
                ..Default::default()
            },
            stage,
        }
    }

    /// Stage-0 entry restored from a tree, with no stat information
    pub fn from_database_entry(name: PathBuf, entry: &DatabaseEntry) -> Self {
        Self::conflicted(name, entry, Stage::Merged)
    }

    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("invalid file name {}", self.name.display()))
    }

    /// Every ancestor directory of the entry, outermost first
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs = self
            .name
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<Vec<_>>();
        dirs.reverse();

        dirs
    }

    pub fn mode(&self) -> EntryMode {
        self.metadata.mode
    }

    pub fn database_entry(&self) -> DatabaseEntry {
        DatabaseEntry::new(self.oid.clone(), self.metadata.mode)
    }

    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }

    fn flags(&self, name_len: usize) -> u16 {
        (self.stage.as_u16() << STAGE_SHIFT) | min(name_len, MAX_PATH_SIZE) as u16
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.stage == other.stage
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.name, self.stage).cmp(&(&other.name, other.stage))
    }
}

/// File metadata stored in index entries
///
/// Timestamps and inode data let status skip rehashing files whose stat
/// information has not moved since they were staged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let entry_name = self
            .name
            .to_str()
            .ok_or_else(|| anyhow!("invalid entry name {}", self.name.display()))?;

        let mut entry_bytes = Vec::with_capacity(ENTRY_MIN_SIZE + entry_name.len());
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime_nsec as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size as u32)?;
        self.oid.write_h40_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(self.flags(entry_name.len()))?;
        entry_bytes.write_all(entry_name.as_bytes())?;

        // at least one NUL terminator, then pad to the block size
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.len() < ENTRY_MIN_SIZE {
            return Err(anyhow!("invalid index entry size"));
        }

        let ctime = byteorder::NetworkEndian::read_u32(&bytes[0..4]) as i64;
        let ctime_nsec = byteorder::NetworkEndian::read_u32(&bytes[4..8]) as i64;
        let mtime = byteorder::NetworkEndian::read_u32(&bytes[8..12]) as i64;
        let mtime_nsec = byteorder::NetworkEndian::read_u32(&bytes[12..16]) as i64;
        let dev = byteorder::NetworkEndian::read_u32(&bytes[16..20]) as u64;
        let ino = byteorder::NetworkEndian::read_u32(&bytes[20..24]) as u64;
        let mode = EntryMode::try_from(byteorder::NetworkEndian::read_u32(&bytes[24..28]))?;
        let uid = byteorder::NetworkEndian::read_u32(&bytes[28..32]);
        let gid = byteorder::NetworkEndian::read_u32(&bytes[32..36]);
        let size = byteorder::NetworkEndian::read_u32(&bytes[36..40]) as u64;
        let oid = ObjectId::read_h40_from(&mut &bytes[40..60])?;
        let flags = byteorder::NetworkEndian::read_u16(&bytes[60..62]);
        let stage = Stage::try_from((flags & STAGE_MASK) >> STAGE_SHIFT)?;

        let name_end = bytes[62..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| anyhow!("missing null terminator in entry name"))?;
        let name = std::str::from_utf8(&bytes[62..62 + name_end])
            .map_err(|_| anyhow!("invalid UTF-8 in entry name"))?;

        Ok(IndexEntry {
            name: PathBuf::from(name),
            oid,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
            stage,
        })
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let mode = if metadata.is_dir() {
            EntryMode::Directory
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        Ok(Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn oid() -> ObjectId {
        ObjectId::digest(b"blob 9\0test data")
    }

    #[fixture]
    fn entry_metadata() -> EntryMetadata {
        EntryMetadata {
            mode: EntryMode::File(FileMode::Regular),
            size: 9,
            ..Default::default()
        }
    }

    #[rstest]
    fn parent_dirs_are_listed_outermost_first(oid: ObjectId, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), oid, entry_metadata);

        assert_eq!(entry.parent_dirs(), vec![Path::new("a"), Path::new("a/b")]);
    }

    #[rstest]
    fn top_level_entry_has_no_parent_dirs(oid: ObjectId, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a"), oid, entry_metadata);

        assert_eq!(entry.parent_dirs(), Vec::<&Path>::new());
        assert_eq!(entry.basename().unwrap(), "a");
    }

    #[rstest]
    #[case(Stage::Merged)]
    #[case(Stage::Base)]
    #[case(Stage::Ours)]
    #[case(Stage::Theirs)]
    fn stage_survives_serialization(
        oid: ObjectId,
        entry_metadata: EntryMetadata,
        #[case] stage: Stage,
    ) {
        let mut entry = IndexEntry::new(PathBuf::from("dir/file.txt"), oid, entry_metadata);
        entry.stage = stage;

        let bytes = entry.serialize().unwrap();
        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);

        let parsed = IndexEntry::deserialize(bytes.as_ref()).unwrap();
        assert_eq!(parsed.stage, stage);
        assert_eq!(parsed.name, entry.name);
        assert_eq!(parsed.oid, entry.oid);
        assert_eq!(parsed.metadata, entry.metadata);
    }
}
