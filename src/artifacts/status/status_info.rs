use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::status::file_change::{FileChange, IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use derive_new::new;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub type FileStatSet = BTreeMap<PathBuf, EntryMetadata>;
pub type HeadTree = BTreeMap<PathBuf, DatabaseEntry>;

/// Snapshot of how HEAD, the index and the working tree relate
#[derive(Debug, Clone, Default)]
pub struct StatusInfo {
    /// Untracked files, and untracked directories with a trailing separator
    pub untracked_files: BTreeSet<PathBuf>,
    pub changed_files: BTreeMap<PathBuf, FileChange>,
    pub conflicted_files: BTreeSet<PathBuf>,
    pub head_tree: HeadTree,
}

impl StatusInfo {
    pub fn index_changes(&self) -> impl Iterator<Item = (&PathBuf, IndexChangeType)> {
        self.changed_files
            .iter()
            .filter(|(_, change)| change.index_change != IndexChangeType::None)
            .map(|(path, change)| (path, change.index_change))
    }

    pub fn workspace_changes(&self) -> impl Iterator<Item = (&PathBuf, WorkspaceChangeType)> {
        self.changed_files
            .iter()
            .filter(|(_, change)| change.workspace_change != WorkspaceChangeType::None)
            .map(|(path, change)| (path, change.workspace_change))
    }

    /// No staged, unstaged or conflicted change; untracked files do not count
    pub fn is_clean(&self) -> bool {
        self.changed_files.is_empty() && self.conflicted_files.is_empty()
    }
}

#[derive(new)]
pub struct Status<'r> {
    repository: &'r Repository,
}

impl<'r> Status<'r> {
    /// Compare all three areas
    ///
    /// Index entries whose file only had its timestamps touched get their stat
    /// information refreshed, so the caller may want to write the index back.
    pub async fn initialize(&self, index: &mut Index) -> anyhow::Result<StatusInfo> {
        let inspector = Inspector::new(self.repository);
        let mut file_stats = FileStatSet::new();
        let mut untracked_files = BTreeSet::new();

        self.scan_workspace(None, &mut untracked_files, &mut file_stats, index, &inspector)
            .await?;

        let head_tree = self.repository.head_tree_map()?;
        let conflicted_files = index.conflicted_paths().into_iter().collect::<BTreeSet<_>>();

        let mut changed_files = BTreeMap::<PathBuf, FileChange>::new();
        let tracked = index.tracked_entries().cloned().collect::<Vec<_>>();
        for entry in &tracked {
            self.check_index_entry_against_workspace(
                entry,
                &file_stats,
                index,
                &inspector,
                &mut changed_files,
            )?;

            let index_change =
                inspector.check_index_against_head_tree(Some(entry), head_tree.get(&entry.name));
            if index_change != IndexChangeType::None {
                changed_files.entry(entry.name.clone()).or_default().index_change = index_change;
            }
        }

        for path in head_tree.keys() {
            if index.entry_by_path(path).is_none() && !conflicted_files.contains(path) {
                changed_files.entry(path.clone()).or_default().index_change =
                    IndexChangeType::Deleted;
            }
        }

        Ok(StatusInfo {
            untracked_files,
            changed_files,
            conflicted_files,
            head_tree,
        })
    }

    async fn scan_workspace(
        &self,
        prefix_path: Option<&Path>,
        untracked_files: &mut BTreeSet<PathBuf>,
        file_stats: &mut FileStatSet,
        index: &Index,
        inspector: &Inspector<'_>,
    ) -> anyhow::Result<()> {
        let workspace = self.repository.workspace();

        for path in workspace.list_dir(prefix_path)? {
            let is_dir = workspace.is_dir(&path);

            if index.is_directly_tracked(&path) {
                if is_dir {
                    Box::pin(self.scan_workspace(
                        Some(&path),
                        untracked_files,
                        file_stats,
                        index,
                        inspector,
                    ))
                    .await?;
                } else {
                    file_stats.insert(path.clone(), workspace.stat_file(&path)?);
                }
            } else if inspector.is_trackable(&path, index)? {
                let mut path = path;
                if is_dir {
                    path.push("");
                }
                untracked_files.insert(path);
            }
        }

        Ok(())
    }

    fn check_index_entry_against_workspace(
        &self,
        index_entry: &IndexEntry,
        file_stats: &FileStatSet,
        index: &mut Index,
        inspector: &Inspector<'_>,
        changed_files: &mut BTreeMap<PathBuf, FileChange>,
    ) -> anyhow::Result<()> {
        let stat = file_stats.get(&index_entry.name);
        let change = inspector.check_index_against_workspace(Some(index_entry), stat)?;

        if change != WorkspaceChangeType::None {
            changed_files
                .entry(index_entry.name.clone())
                .or_default()
                .workspace_change = change;
        } else if let Some(stat) = stat {
            if !index_entry.times_match(stat) {
                index.update_entry_stat(&index_entry.name, stat.clone());
            }
        }

        Ok(())
    }
}
