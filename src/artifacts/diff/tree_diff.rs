use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn old_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Deleted(entry) => Some(entry),
            TreeChangeType::Modified { old, .. } => Some(old),
            TreeChangeType::Added(_) => None,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }

    pub fn status_char(&self) -> char {
        match self {
            TreeChangeType::Added(_) => 'A',
            TreeChangeType::Deleted(_) => 'D',
            TreeChangeType::Modified { .. } => 'M',
        }
    }
}

pub type ChangeSet = BTreeMap<PathBuf, TreeChangeType>;
pub type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

/// Changes between two flattened `path -> entry` snapshots
pub fn diff_flat_maps(
    old: &BTreeMap<PathBuf, DatabaseEntry>,
    new: &BTreeMap<PathBuf, DatabaseEntry>,
) -> ChangeSet {
    let mut change_set = ChangeSet::new();

    for (path, old_entry) in old {
        if let Some(change) =
            TreeChangeType::from_entries(Some(old_entry.clone()), new.get(path).cloned())
        {
            change_set.insert(path.clone(), change);
        }
    }

    for (path, new_entry) in new {
        if !old.contains_key(path) {
            change_set.insert(path.clone(), TreeChangeType::Added(new_entry.clone()));
        }
    }

    change_set
}

/// Recursive structural comparison of two trees
///
/// Subtrees with equal ids are skipped without being loaded. Only blob paths
/// appear in the result; a directory replaced by a file shows up as deletions
/// of the directory's files plus the addition of the file.
#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    change_set: ChangeSet,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database) -> Self {
        TreeDiff {
            database,
            change_set: BTreeMap::new(),
        }
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn into_changes(self) -> ChangeSet {
        self.change_set
    }

    /// Compare two trees, or the trees of two commits
    pub fn compare_oids(
        &mut self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        if old == new {
            return Ok(());
        }

        let old_tree_entries = self.inflate_oid_to_tree_entries(old)?;
        let new_tree_entries = self.inflate_oid_to_tree_entries(new)?;

        self.detect_deletions(&old_tree_entries, &new_tree_entries, prefix)?;
        self.detect_additions(&old_tree_entries, &new_tree_entries, prefix)?;

        Ok(())
    }

    fn inflate_oid_to_tree_entries(&self, oid: Option<&ObjectId>) -> anyhow::Result<TreeEntryMap> {
        let Some(oid) = oid else {
            return Ok(TreeEntryMap::new());
        };

        let peeled = self.database.peel(oid)?;
        let tree_oid = match self.database.object_type(&peeled)? {
            ObjectType::Commit => self.database.commit_tree_oid(&peeled)?,
            _ => peeled,
        };

        Ok(self
            .database
            .parse_object_as_tree(&tree_oid)?
            .into_entries()
            .collect())
    }

    fn detect_deletions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        for (name, entry) in old {
            let path = prefix.join(name);
            let other = new.get(name);

            if other == Some(entry) {
                continue;
            }

            let old_subtree = entry.is_tree().then_some(&entry.oid);
            let new_subtree = other.filter(|other| other.is_tree()).map(|other| &other.oid);
            self.compare_oids(old_subtree, new_subtree, &path)?;

            let old_blob = (!entry.is_tree()).then(|| entry.clone());
            let new_blob = other.filter(|other| !other.is_tree()).cloned();

            if let Some(change_type) = TreeChangeType::from_entries(old_blob, new_blob) {
                self.change_set.insert(path, change_type);
            }
        }

        Ok(())
    }

    fn detect_additions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        for (name, entry) in new {
            if old.contains_key(name) {
                continue;
            }

            let path = prefix.join(name);
            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &path)?;
            } else {
                self.change_set
                    .insert(path, TreeChangeType::Added(entry.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn store_tree(database: &Database, files: &[(&str, &str)]) -> ObjectId {
        let entries = files
            .iter()
            .map(|(path, content)| {
                let oid = database
                    .store(&Blob::new(Bytes::from(content.to_string())))
                    .unwrap();
                IndexEntry::new(
                    PathBuf::from(path),
                    oid,
                    EntryMetadata {
                        mode: EntryMode::File(FileMode::Regular),
                        ..Default::default()
                    },
                )
            })
            .collect::<Vec<_>>();

        let tree = Tree::build(entries.iter()).unwrap();
        tree.traverse(&mut |subtree| database.store(subtree).map(|_| ()))
            .unwrap();
        database.store(&tree).unwrap()
    }

    fn summary(changes: &ChangeSet) -> Vec<String> {
        changes
            .iter()
            .map(|(path, change)| format!("{} {}", change.status_char(), path.display()))
            .collect()
    }

    #[test]
    fn nested_changes_are_reported_by_full_path() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());

        let old = store_tree(
            &database,
            &[("a.txt", "1"), ("dir/b.txt", "b"), ("dir/sub/c.txt", "c"), ("gone.txt", "x")],
        );
        let new = store_tree(
            &database,
            &[("a.txt", "2"), ("dir/b.txt", "b"), ("dir/sub/d.txt", "d")],
        );

        let diff = database.tree_diff(Some(&old), Some(&new)).unwrap();

        assert_eq!(
            summary(diff.changes()),
            vec!["M a.txt", "D dir/sub/c.txt", "A dir/sub/d.txt", "D gone.txt"]
        );
    }

    #[test]
    fn file_replacing_directory_is_a_delete_plus_add() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());

        let old = store_tree(&database, &[("x/inner.txt", "i")]);
        let new = store_tree(&database, &[("x", "file")]);

        let diff = database.tree_diff(Some(&old), Some(&new)).unwrap();

        assert_eq!(summary(diff.changes()), vec!["A x", "D x/inner.txt"]);
    }

    #[test]
    fn flat_maps_agree_with_tree_walk() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());

        let old = store_tree(&database, &[("a", "1"), ("b/c", "2")]);
        let new = store_tree(&database, &[("a", "1"), ("b/c", "3"), ("d", "4")]);

        let walked = database.tree_diff(Some(&old), Some(&new)).unwrap();
        let flat = diff_flat_maps(
            &database.flatten_tree(&old).unwrap(),
            &database.flatten_tree(&new).unwrap(),
        );

        assert_eq!(walked.changes(), &flat);
    }
}
