//! Moving the working tree and index from one tree to another
//!
//! A migration is planned in full before anything is touched:
//!
//! 1. every changed path is checked against local modifications, and the whole
//!    migration is refused if any of them would be lost
//! 2. file system actions are grouped into deletions, modifications and additions,
//!    along with the directories to remove and create
//! 3. the working tree is updated, then the index entries for every touched path
//!
//! ## Conflict detection
//!
//! - Stale files: the working tree or index differs from both trees
//! - Stale directories: a directory with untracked files sits where a file goes
//! - Untracked overwrites: an untracked file would be replaced
//! - Untracked removals: an untracked file is in the way of a removal

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::conflict::{ConflictMessage, ConflictType};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use crate::errors::RepositoryError;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Add,
    Delete,
    Modify,
}

pub type ActionsSet = HashMap<ActionType, Vec<(PathBuf, Option<DatabaseEntry>)>>;

pub type ConflictsSet = BTreeMap<ConflictType, Vec<PathBuf>>;

/// Paths rewritten outside the tree change itself, with our and their entries
pub type GuardedPaths = BTreeMap<PathBuf, (Option<DatabaseEntry>, Option<DatabaseEntry>)>;

pub struct Migration<'r> {
    repository: &'r Repository,
    index: &'r mut Index,
    changes: ChangeSet,
    guarded: GuardedPaths,
    check_conflicts: bool,
    inspector: Inspector<'r>,
    actions: ActionsSet,
    conflicts: ConflictsSet,
    mkdirs: BTreeSet<PathBuf>,
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn new(repository: &'r Repository, index: &'r mut Index, changes: ChangeSet) -> Self {
        Self {
            repository,
            index,
            changes,
            guarded: GuardedPaths::new(),
            check_conflicts: true,
            inspector: Inspector::new(repository),
            actions: HashMap::new(),
            conflicts: ConflictsSet::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        }
    }

    /// Discard local changes instead of refusing to overwrite them
    pub fn force(mut self) -> Self {
        self.check_conflicts = false;
        self
    }

    /// Also refuse when local changes to these paths would be lost
    pub fn guard(mut self, guarded: GuardedPaths) -> Self {
        self.guarded = guarded;
        self
    }

    pub fn actions(&self) -> &ActionsSet {
        &self.actions
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    pub fn apply_changes(&mut self) -> anyhow::Result<()> {
        self.plan_changes()?;
        self.repository.workspace().apply_migration(self)?;
        self.update_index()?;

        debug!(
            added = self.action_count(ActionType::Add),
            modified = self.action_count(ActionType::Modify),
            deleted = self.action_count(ActionType::Delete),
            "working tree migrated"
        );
        Ok(())
    }

    fn action_count(&self, action_type: ActionType) -> usize {
        self.actions.get(&action_type).map_or(0, Vec::len)
    }

    fn plan_changes(&mut self) -> anyhow::Result<()> {
        let changes = std::mem::take(&mut self.changes);

        for (path, change) in &changes {
            if self.check_conflicts {
                self.check_for_conflict(path, change.old_entry(), change.new_entry())?;
            }
            self.record_change(path, change);
        }

        if self.check_conflicts {
            let guarded = std::mem::take(&mut self.guarded);
            for (path, (ours, theirs)) in &guarded {
                self.check_for_conflict(path, ours.as_ref(), theirs.as_ref())?;
            }
            self.guarded = guarded;
        }
        self.changes = changes;

        let errors = self.collect_errors();
        if !errors.is_empty() {
            return Err(RepositoryError::validation(format!(
                "{}\nAborting",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    fn collect_errors(&self) -> Vec<String> {
        self.conflicts
            .iter()
            .filter(|(_, paths)| !paths.is_empty())
            .map(|(conflict_type, paths)| {
                let paths = paths
                    .iter()
                    .map(|path| format!("\t{}", path.display()))
                    .collect::<Vec<_>>();

                let ConflictMessage { header, footer } = conflict_type.into();
                format!("error: {header}\n{}\n{footer}", paths.join("\n"))
            })
            .collect()
    }

    fn check_for_conflict(
        &mut self,
        path: &Path,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> anyhow::Result<()> {
        let entry = self.index.entry_by_path(path).cloned();
        let entry = entry.as_ref();

        if self.index_differs_from_trees(entry, old_entry, new_entry) {
            self.record_conflict(ConflictType::StaleFile, path);
            return Ok(());
        }

        let stat = self.repository.workspace().stat_file(path).ok();
        let conflict_type = ConflictType::classify(stat.as_ref(), entry, new_entry);

        match stat {
            Some(stat) if stat.mode.is_tree() => {
                if self.inspector.is_trackable(path, self.index)? {
                    self.record_conflict(conflict_type, path);
                }
            }
            Some(stat) => {
                let change = self
                    .inspector
                    .check_index_against_workspace(entry, Some(&stat))?;
                if change != WorkspaceChangeType::None {
                    self.record_conflict(conflict_type, path);
                }
            }
            None => {
                if let Some(parent) = self.untracked_parent(path)? {
                    let reported = if entry.is_some() { path } else { parent.as_path() };
                    self.record_conflict(conflict_type, reported);
                }
            }
        }

        Ok(())
    }

    fn record_conflict(&mut self, conflict_type: ConflictType, path: &Path) {
        self.conflicts
            .entry(conflict_type)
            .or_default()
            .push(path.to_path_buf());
    }

    /// An untracked file standing where one of `path`'s parent directories should be
    fn untracked_parent(&self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }

            let Ok(parent_stat) = self.repository.workspace().stat_file(parent) else {
                continue;
            };
            if !parent_stat.mode.is_tree() && self.inspector.is_trackable(parent, self.index)? {
                return Ok(Some(parent.to_path_buf()));
            }
        }

        Ok(None)
    }

    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> bool {
        self.inspector
            .check_index_against_head_tree(index_entry, old_entry)
            != IndexChangeType::None
            && self
                .inspector
                .check_index_against_head_tree(index_entry, new_entry)
                != IndexChangeType::None
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let parents = path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let (action_type, entry) = match change {
            TreeChangeType::Added(new_entry) => {
                self.mkdirs.extend(parents);
                (ActionType::Add, Some(new_entry.clone()))
            }
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(parents);
                (ActionType::Delete, None)
            }
            TreeChangeType::Modified { new, .. } => {
                self.mkdirs.extend(parents);
                (ActionType::Modify, Some(new.clone()))
            }
        };

        self.actions
            .entry(action_type)
            .or_default()
            .push((path.to_path_buf(), entry));
    }

    fn update_index(&mut self) -> anyhow::Result<()> {
        for action_type in [ActionType::Delete, ActionType::Modify, ActionType::Add] {
            let Some(actions) = self.actions.get(&action_type) else {
                continue;
            };

            for (file_path, entry) in actions {
                match entry {
                    None => self.index.remove(file_path),
                    Some(entry) => {
                        let stat = self.repository.workspace().stat_file(file_path)?;
                        self.index
                            .add(IndexEntry::new(file_path.clone(), entry.oid.clone(), stat));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn load_blob_data(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        Ok(self
            .repository
            .database()
            .parse_object_as_blob(object_id)?
            .into_content())
    }
}
