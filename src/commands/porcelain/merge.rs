use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::checkout::migration::{GuardedPaths, Migration};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::diff_flat_maps;
use crate::artifacts::merge::MergeOutcome;
use crate::artifacts::merge::merge_state::{MergeState, PendingKind};
use crate::artifacts::merge::resolution::{
    FlatTree, MergeResolution, PathResolution, render_conflict,
};
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use bytes::Bytes;
use std::io::Write;
use tracing::{debug, info};

impl Repository {
    /// Merge another revision into HEAD
    ///
    /// Fast-forwards when HEAD is an ancestor of the incoming commit. Otherwise the
    /// trees are merged against the best common ancestor: a clean result is
    /// committed with two parents, a conflicted one is left in the working tree
    /// and index with a pending merge recorded.
    pub async fn merge(
        &mut self,
        target: &str,
        message: Option<&str>,
    ) -> anyhow::Result<MergeOutcome> {
        let _lock = self.lock()?;
        self.ensure_no_pending_merge()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        self.ensure_index_matches_head(&index)?;

        let head_oid = self.refs().resolve_head()?;
        let incoming_oid = Revision::try_parse(target)?.resolve(self)?;

        if head_oid == incoming_oid || self.is_ancestor(&incoming_oid, &head_oid)? {
            writeln!(self.writer(), "Already up to date.")?;
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        if self.is_ancestor(&head_oid, &incoming_oid)? {
            self.migrate_working_tree(&mut index, Some(&head_oid), Some(&incoming_oid))?;
            index.write_updates()?;
            self.refs().update_head(Some(&head_oid), &incoming_oid)?;

            info!(from = %head_oid, to = %incoming_oid, "fast-forward");
            writeln!(
                self.writer(),
                "Updating {}..{}\nFast-forward",
                head_oid.to_short_oid(),
                incoming_oid.to_short_oid()
            )?;
            return Ok(MergeOutcome::FastForward(incoming_oid));
        }

        let base_oid = self.merge_base(&head_oid, &incoming_oid)?;
        let base = self.database().commit_tree_map(base_oid.as_ref())?;
        let ours = self.database().commit_tree_map(Some(&head_oid))?;
        let theirs = self.database().commit_tree_map(Some(&incoming_oid))?;

        let resolution = MergeResolution::resolve(&base, &ours, &theirs)?;
        self.materialize_merge(&mut index, &resolution, &ours)?;
        index.write_updates()?;

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| self.default_merge_message(target));

        if resolution.is_clean() {
            let tree_oid = index.snapshot_to_tree(self.database())?;
            let author = Author::load_from_env();
            let merge_oid = self.record_commit(
                vec![head_oid, incoming_oid],
                tree_oid,
                author.clone(),
                author,
                message,
            )?;
            return Ok(MergeOutcome::Merged(merge_oid));
        }

        let conflicts = resolution.conflicted_paths();
        self.write_merge_state(&MergeState {
            kind: PendingKind::Merge,
            incoming: incoming_oid,
            message,
            conflicts: conflicts.clone(),
        })?;
        writeln!(
            self.writer(),
            "Automatic merge failed; fix conflicts and then commit the result."
        )?;

        Ok(MergeOutcome::Conflicted(conflicts))
    }

    /// Drop a conflicted merge or cherry-pick, restoring HEAD's tree
    pub async fn merge_abort(&mut self) -> anyhow::Result<()> {
        let _lock = self.lock()?;

        let Some(state) = self.merge_state()? else {
            return Err(RepositoryError::not_found("merge or cherry-pick to abort"));
        };

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let head_oid = self.refs().read_head()?;
        self.restore_to_commit(&mut index, head_oid.as_ref())?;
        index.write_updates()?;
        self.clear_merge_state()?;

        info!(kind = state.kind.as_str(), incoming = %state.incoming, "pending operation aborted");
        Ok(())
    }

    /// Apply a three-way resolution on top of our tree
    ///
    /// Clean paths are written and staged. Conflicted paths get their stages
    /// recorded in the index and a marker file in the working tree. Nothing is
    /// touched if a local change to any affected path would be lost.
    pub(crate) fn materialize_merge(
        &self,
        index: &mut Index,
        resolution: &MergeResolution,
        ours: &FlatTree,
    ) -> anyhow::Result<()> {
        let changes = diff_flat_maps(ours, &resolution.merged_tree());
        let guarded = resolution
            .conflicts()
            .filter_map(|(path, resolution)| match resolution {
                PathResolution::Conflict { ours, theirs, .. } => {
                    Some((path.clone(), (ours.clone(), theirs.clone())))
                }
                _ => None,
            })
            .collect::<GuardedPaths>();

        Migration::new(self, index, changes)
            .guard(guarded)
            .apply_changes()?;

        for (path, path_resolution) in resolution.conflicts() {
            let PathResolution::Conflict {
                base,
                ours,
                theirs,
                kind,
            } = path_resolution
            else {
                continue;
            };

            let ours_data = self.load_side(ours.as_ref())?;
            let theirs_data = self.load_side(theirs.as_ref())?;
            let content = render_conflict(ours_data.as_deref(), theirs_data.as_deref());
            let mode = ours
                .as_ref()
                .or(theirs.as_ref())
                .map(|entry| entry.mode)
                .unwrap_or_default();

            self.workspace().write_file(path, &content, mode)?;
            index.add_conflict(path, base.as_ref(), ours.as_ref(), theirs.as_ref());

            writeln!(
                self.writer(),
                "CONFLICT ({}): Merge conflict in {}",
                kind.describe(),
                path.display()
            )?;
        }

        debug!(
            paths = resolution.iter().count(),
            conflicts = resolution.conflicts().count(),
            "three-way merge materialized"
        );
        Ok(())
    }

    /// Merge-class operations start from an index identical to HEAD's tree
    pub(crate) fn ensure_index_matches_head(&self, index: &Index) -> anyhow::Result<()> {
        if index.has_conflicts() {
            return Err(RepositoryError::DirtyMerge(index.conflicted_paths()).into());
        }
        if index.tracked_map() != self.head_tree_map()? {
            return Err(RepositoryError::validation(
                "your index contains uncommitted changes; commit or stash them first",
            ));
        }

        Ok(())
    }

    fn load_side(&self, entry: Option<&DatabaseEntry>) -> anyhow::Result<Option<Bytes>> {
        entry
            .map(|entry| {
                self.database()
                    .parse_object_as_blob(&entry.oid)
                    .map(|blob| blob.into_content())
            })
            .transpose()
    }

    fn default_merge_message(&self, target: &str) -> String {
        let is_branch = BranchName::try_parse(target.to_string())
            .is_ok_and(|branch| self.refs().branch_exists(&branch));

        if is_branch {
            format!("Merge branch '{target}'")
        } else {
            format!("Merge commit '{target}'")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn merge_refuses_while_another_merge_is_pending() {
        let dir = assert_fs::TempDir::new().unwrap();
        let mut repository = Repository::new(dir.path(), Box::new(std::io::sink())).unwrap();
        repository.init().await.unwrap();

        let state = MergeState {
            kind: PendingKind::Merge,
            incoming: ObjectId::try_parse("a".repeat(40)).unwrap(),
            message: "Merge branch 'topic'".to_string(),
            conflicts: vec![],
        };
        repository.write_merge_state(&state).unwrap();

        let error = repository.merge("topic", None).await.unwrap_err();

        assert!(matches!(
            RepositoryError::classify(&error),
            Some(RepositoryError::MergeInProgress(kind)) if kind == "merge"
        ));
        assert_eq!(repository.merge_state().unwrap(), Some(state));
    }
}
