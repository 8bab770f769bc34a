use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use tracing::info;

/// How much of the repository a reset rewinds besides the ref
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Only the ref moves
    Soft,
    /// The ref moves and the index is replaced by the target's tree
    #[default]
    Mixed,
    /// Ref, index and working tree all end up exactly at the target
    Hard,
}

impl ResetMode {
    fn as_str(&self) -> &'static str {
        match self {
            ResetMode::Soft => "soft",
            ResetMode::Mixed => "mixed",
            ResetMode::Hard => "hard",
        }
    }
}

impl Repository {
    pub async fn reset(&mut self, target: Option<&str>, mode: ResetMode) -> anyhow::Result<ObjectId> {
        let _lock = self.lock()?;

        let target_oid = Revision::try_parse(target.unwrap_or("HEAD"))?.resolve(self)?;
        let merge_state = self.merge_state()?;
        if mode == ResetMode::Soft {
            if let Some(state) = &merge_state {
                return Err(RepositoryError::MergeInProgress(state.kind.as_str().to_string()).into());
            }
        }

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let previous_oid = self.refs().read_head()?;

        match mode {
            ResetMode::Soft => {}
            ResetMode::Mixed => {
                let target_tree = self.database().commit_tree_map(Some(&target_oid))?;
                index.reset_to_tree(target_tree);
            }
            ResetMode::Hard => self.restore_to_commit(&mut index, Some(&target_oid))?,
        }
        index.write_if_changed()?;

        if previous_oid.as_ref() != Some(&target_oid) {
            self.refs().update_head(previous_oid.as_ref(), &target_oid)?;
        }
        if merge_state.is_some() {
            self.clear_merge_state()?;
        }

        info!(mode = mode.as_str(), target = %target_oid, "reset");
        if mode == ResetMode::Hard {
            self.print_head_position("HEAD is now at", &target_oid)?;
        }

        Ok(target_oid)
    }

    /// Rewrite every tracked file and the whole index to match a commit
    ///
    /// Local changes to tracked files are discarded; untracked files are left alone
    /// unless the commit has a file at the same path.
    pub(crate) fn restore_to_commit(
        &self,
        index: &mut Index,
        target: Option<&ObjectId>,
    ) -> anyhow::Result<()> {
        let target_tree = self.database().commit_tree_map(target)?;

        let mut current = self.head_tree_map()?;
        current.extend(
            index
                .entries()
                .map(|entry| (entry.name.clone(), entry.database_entry())),
        );

        let mut changes = ChangeSet::new();
        for (path, old) in &current {
            if !target_tree.contains_key(path) {
                changes.insert(path.clone(), TreeChangeType::Deleted(old.clone()));
            }
        }
        for (path, new) in &target_tree {
            let change = match current.get(path) {
                Some(old) => TreeChangeType::Modified {
                    old: old.clone(),
                    new: new.clone(),
                },
                None => TreeChangeType::Added(new.clone()),
            };
            changes.insert(path.clone(), change);
        }

        Migration::new(self, index, changes).force().apply_changes()?;

        index.reset_to_tree(target_tree.clone());
        for path in target_tree.keys() {
            index.update_entry_stat(path, self.workspace().stat_file(path)?);
        }

        Ok(())
    }
}
