//! Index (staging area)
//!
//! The index records the tree the next commit will snapshot. Every path is either
//! merged, with a single stage-0 entry, or conflicted, with up to three entries
//! at stages 1 (base), 2 (ours) and 3 (theirs). The two never coexist.
//!
//! ## Index File Format
//!
//! - Header: signature, version and entry count
//! - Entries: ordered by (path, stage)
//! - Checksum: SHA-1 of everything before it
//!
//! The file is rewritten as a whole through `index.lock`, then renamed into place.
//!
//! ## Data Structures
//!
//! - `entries`: entries keyed by path and stage
//! - `children`: directory paths mapped to the entry paths beneath them

use crate::areas::database::Database;
use crate::areas::lock::Lockfile;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::ChecksummedFile;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryMetadata, IndexEntry, Stage,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::HEADER_SIZE;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::errors::RepositoryError;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use tracing::debug;

type EntryKey = (PathBuf, Stage);

#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (`.twig/index`)
    path: Box<Path>,
    entries: BTreeMap<EntryKey, IndexEntry>,
    children: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    /// Set when the in-memory entries diverge from the file
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage-0 entry for `path`
    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entry_at(path, Stage::Merged)
    }

    pub fn entry_at(&self, path: &Path, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_path_buf(), stage))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.changed = true;
    }

    /// Load the index from disk
    ///
    /// A missing or empty file yields an empty index. The checksum is verified
    /// after all entries are read, under a shared lock on the file.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();
        self.changed = false;

        if !self.path().exists() {
            return Ok(());
        }

        let mut index_file = std::fs::OpenOptions::new().read(true).open(self.path())?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = ChecksummedFile::new(lock);
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;

        reader.verify()
    }

    /// True when `path` is a stage-0 file or a directory containing tracked files
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entries
            .range((path.to_path_buf(), Stage::Merged)..=(path.to_path_buf(), Stage::Theirs))
            .next()
            .is_some()
            || self.children.contains_key(path)
    }

    fn parse_header(&self, reader: &mut ChecksummedFile) -> anyhow::Result<u32> {
        let header_bytes = reader.read_exact(HEADER_SIZE)?;

        Ok(IndexHeader::deserialize(header_bytes.as_ref())?.entries_count)
    }

    fn parse_entries(&mut self, entries_count: u32, reader: &mut ChecksummedFile) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read_exact(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes[entry_bytes.len() - 1] != 0 {
                entry_bytes.extend_from_slice(&reader.read_exact(ENTRY_BLOCK)?);
            }

            let entry = IndexEntry::deserialize(Bytes::from(entry_bytes).as_ref())?;
            self.store_entry(entry);
        }

        Ok(())
    }

    /// Drop whatever would collide with a file at `path`: files at any of its
    /// parent directories, and everything beneath `path` itself
    fn discard_conflicts(&mut self, path: &Path) {
        for parent in path.ancestors().skip(1) {
            if !parent.as_os_str().is_empty() {
                self.remove_path(parent);
            }
        }
        self.remove_children(path);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_path_buf())
                .or_default()
                .insert(entry.name.clone());
        }

        self.entries
            .insert((entry.name.clone(), entry.stage), entry);
    }

    fn remove_children(&mut self, path: &Path) {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                self.remove_path(&child);
            }
        }
    }

    /// Remove every stage recorded for `path`
    fn remove_path(&mut self, path: &Path) {
        let mut removed = None;
        for stage in [Stage::Merged, Stage::Base, Stage::Ours, Stage::Theirs] {
            if let Some(entry) = self.entries.remove(&(path.to_path_buf(), stage)) {
                removed = Some(entry);
            }
        }

        if let Some(entry) = removed {
            for parent in entry.parent_dirs() {
                if let Some(children) = self.children.get_mut(parent) {
                    children.remove(path);
                    if children.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
        }
    }

    fn touch(&mut self) {
        self.changed = true;
    }

    /// Stage a merged entry, resolving any conflict recorded for its path
    pub fn add(&mut self, mut entry: IndexEntry) {
        entry.stage = Stage::Merged;

        self.discard_conflicts(&entry.name);
        self.remove_path(&entry.name);
        self.store_entry(entry);
        self.touch();
    }

    /// Replace `path` with conflict stages; absent sides are simply not recorded
    pub fn add_conflict(
        &mut self,
        path: &Path,
        base: Option<&DatabaseEntry>,
        ours: Option<&DatabaseEntry>,
        theirs: Option<&DatabaseEntry>,
    ) {
        self.discard_conflicts(path);
        self.remove_path(path);

        for (stage, side) in Stage::CONFLICT_STAGES.into_iter().zip([base, ours, theirs]) {
            if let Some(side) = side {
                self.store_entry(IndexEntry::conflicted(path.to_path_buf(), side, stage));
            }
        }
        self.touch();
    }

    /// Untrack `path`, or everything beneath it when it names a directory
    pub fn remove(&mut self, path: &Path) {
        self.remove_path(path);
        self.remove_children(path);
        self.touch();
    }

    /// Paths holding conflict stages, in path order
    pub fn conflicted_paths(&self) -> Vec<PathBuf> {
        self.entries
            .keys()
            .filter(|(_, stage)| stage.is_conflict())
            .map(|(path, _)| path.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| stage.is_conflict())
    }

    /// Conflict stages recorded for `path`, keyed by stage
    pub fn conflict_stages(&self, path: &Path) -> BTreeMap<Stage, &IndexEntry> {
        Stage::CONFLICT_STAGES
            .into_iter()
            .filter_map(|stage| self.entry_at(path, stage).map(|entry| (stage, entry)))
            .collect()
    }

    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let mut lockfile = Lockfile::acquire(self.path())?;

        {
            let index_file = lockfile.file_mut()?;
            let lock = file_guard::lock(index_file, file_guard::Lock::Exclusive, 0, 1)?;
            let mut writer = ChecksummedFile::new(lock);

            let header = IndexHeader::for_entries(self.entries.len())?;
            writer.write_all(&header.serialize()?)?;

            for entry in self.entries.values() {
                writer.write_all(&entry.serialize()?)?;
            }

            writer.finish()?;
        }

        lockfile.commit()?;
        self.changed = false;

        debug!(entries = self.entries.len(), "index written");
        Ok(())
    }

    /// Write only when something was staged since the last load
    pub fn write_if_changed(&mut self) -> anyhow::Result<()> {
        if self.changed {
            self.write_updates()
        } else {
            Ok(())
        }
    }

    /// Store the tree described by the stage-0 entries and return its id
    ///
    /// Fails with `DirtyMerge` while any path is still conflicted.
    pub fn snapshot_to_tree(&self, database: &Database) -> anyhow::Result<ObjectId> {
        if self.has_conflicts() {
            return Err(RepositoryError::DirtyMerge(self.conflicted_paths()).into());
        }

        let root = Tree::build(self.tracked_entries())?;
        root.traverse(&mut |tree| database.store(tree).map(|_| ()))?;

        database.store(&root)
    }

    /// Replace the whole index with the contents of a tree
    pub fn reset_to_tree(&mut self, entries: BTreeMap<PathBuf, DatabaseEntry>) {
        self.entries.clear();
        self.children.clear();

        for (path, entry) in entries {
            self.store_entry(IndexEntry::from_database_entry(path, &entry));
        }
        self.touch();
    }

    pub fn update_entry_stat(&mut self, path: &Path, stat: EntryMetadata) {
        if let Some(existing_entry) = self.entries.get_mut(&(path.to_path_buf(), Stage::Merged)) {
            existing_entry.metadata = stat;
            self.changed = true;
        }
    }

    /// Every entry, all stages, in (path, stage) order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Stage-0 entries only
    pub fn tracked_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries
            .values()
            .filter(|entry| entry.stage == Stage::Merged)
    }

    /// Stage-0 entries flattened to `path -> (oid, mode)`
    pub fn tracked_map(&self) -> BTreeMap<PathBuf, DatabaseEntry> {
        self.tracked_entries()
            .map(|entry| (entry.name.clone(), entry.database_entry()))
            .collect()
    }

    /// Paths with an entry at or below `path`; `.` matches everything
    pub fn entries_under_path(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .keys()
            .map(|(entry_path, _)| entry_path)
            .filter(|entry_path| path == Path::new(".") || entry_path.starts_with(path))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    struct IndexFixture {
        dir: TempDir,
        index: Index,
    }

    #[fixture]
    fn index() -> IndexFixture {
        let dir = TempDir::new().unwrap();
        let index = Index::new(dir.path().join("index").into_boxed_path());

        IndexFixture { dir, index }
    }

    fn file_entry(path: &str, content: &str) -> IndexEntry {
        IndexEntry::new(
            PathBuf::from(path),
            ObjectId::digest(content.as_bytes()),
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                size: content.len() as u64,
                ..Default::default()
            },
        )
    }

    fn db_entry(content: &str) -> DatabaseEntry {
        DatabaseEntry::new(
            ObjectId::digest(content.as_bytes()),
            EntryMode::File(FileMode::Regular),
        )
    }

    fn names(index: &Index) -> Vec<String> {
        index
            .entries()
            .map(|entry| format!("{}:{}", entry.name.display(), entry.stage.as_u16()))
            .collect()
    }

    #[rstest]
    fn file_replaces_directory_and_vice_versa(mut index: IndexFixture) {
        index.index.add(file_entry("alice.txt", "a"));
        index.index.add(file_entry("nested/bob.txt", "b"));
        index.index.add(file_entry("nested/inner/claire.txt", "c"));

        index.index.add(file_entry("nested", "replacement"));
        assert_eq!(names(&index.index), vec!["alice.txt:0", "nested:0"]);

        index.index.add(file_entry("alice.txt/deep.txt", "d"));
        assert_eq!(names(&index.index), vec!["alice.txt/deep.txt:0", "nested:0"]);
    }

    #[rstest]
    fn conflict_stages_replace_merged_entry(mut index: IndexFixture) {
        index.index.add(file_entry("file.txt", "ours"));

        index.index.add_conflict(
            Path::new("file.txt"),
            Some(&db_entry("base")),
            Some(&db_entry("ours")),
            Some(&db_entry("theirs")),
        );

        assert_eq!(
            names(&index.index),
            vec!["file.txt:1", "file.txt:2", "file.txt:3"]
        );
        assert!(index.index.entry_by_path(Path::new("file.txt")).is_none());
        assert_eq!(index.index.conflicted_paths(), vec![PathBuf::from("file.txt")]);
    }

    #[rstest]
    fn staging_a_merged_entry_resolves_the_conflict(mut index: IndexFixture) {
        index.index.add_conflict(
            Path::new("file.txt"),
            None,
            Some(&db_entry("ours")),
            Some(&db_entry("theirs")),
        );
        assert_eq!(names(&index.index), vec!["file.txt:2", "file.txt:3"]);

        index.index.add(file_entry("file.txt", "resolved"));

        assert_eq!(names(&index.index), vec!["file.txt:0"]);
        assert!(!index.index.has_conflicts());
    }

    #[rstest]
    fn snapshot_refuses_conflicted_index(mut index: IndexFixture) {
        let database = Database::new(index.dir.path().join("objects").into_boxed_path());
        index.index.add_conflict(
            Path::new("file.txt"),
            Some(&db_entry("base")),
            Some(&db_entry("ours")),
            None,
        );

        let err = index.index.snapshot_to_tree(&database).unwrap_err();

        assert!(matches!(
            RepositoryError::classify(&err),
            Some(RepositoryError::DirtyMerge(paths)) if paths == &vec![PathBuf::from("file.txt")]
        ));
    }

    #[rstest]
    fn entries_survive_a_write_and_reload(mut index: IndexFixture) {
        index.index.add(file_entry("a/b.txt", "b"));
        index.index.add(file_entry("c.txt", "c"));
        index.index.add_conflict(
            Path::new("d.txt"),
            Some(&db_entry("base")),
            Some(&db_entry("ours")),
            Some(&db_entry("theirs")),
        );
        index.index.write_updates().unwrap();
        assert!(!Lockfile::lock_path_for(index.index.path()).exists());

        let mut reloaded = Index::new(index.index.path().to_path_buf().into_boxed_path());
        reloaded.rehydrate().unwrap();

        assert_eq!(names(&reloaded), names(&index.index));
        assert!(reloaded.is_directly_tracked(Path::new("a")));
    }

    #[rstest]
    fn tampered_index_fails_checksum(mut index: IndexFixture) {
        index.index.add(file_entry("a.txt", "a"));
        index.index.write_updates().unwrap();

        let mut bytes = std::fs::read(index.index.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(index.index.path(), bytes).unwrap();

        assert!(index.index.rehydrate().is_err());
    }
}
