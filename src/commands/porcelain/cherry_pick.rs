use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::merge::PickOutcome;
use crate::artifacts::merge::merge_state::{MergeState, PendingKind};
use crate::artifacts::merge::resolution::MergeResolution;
use crate::artifacts::objects::commit::Author;
use crate::errors::RepositoryError;
use std::io::Write;
use tracing::info;

impl Repository {
    /// Replay the change a commit introduced on top of HEAD
    ///
    /// The commit's first parent serves as the merge base, so picking a merge
    /// commit replays everything it brought in relative to its mainline.
    pub async fn cherry_pick(
        &mut self,
        target: &str,
        message: Option<&str>,
    ) -> anyhow::Result<PickOutcome> {
        let _lock = self.lock()?;
        self.ensure_no_pending_merge()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        self.ensure_index_matches_head(&index)?;

        let head_oid = self.refs().resolve_head()?;
        let picked_oid = Revision::try_parse(target)?.resolve(self)?;
        let picked = self.database().parse_object_as_commit(&picked_oid)?;

        let base = self.database().commit_tree_map(picked.parent())?;
        let ours = self.database().commit_tree_map(Some(&head_oid))?;
        let theirs = self.database().commit_tree_map(Some(&picked_oid))?;

        let resolution = MergeResolution::resolve(&base, &ours, &theirs)?;
        if resolution.is_clean() && resolution.merged_tree() == ours {
            return Err(RepositoryError::validation(format!(
                "cherry-pick of {} would produce an empty commit",
                picked_oid.to_short_oid()
            )));
        }

        self.materialize_merge(&mut index, &resolution, &ours)?;
        index.write_updates()?;

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| picked.message().to_string());

        if resolution.is_clean() {
            let tree_oid = index.snapshot_to_tree(self.database())?;
            let commit_oid = self.record_commit(
                vec![head_oid],
                tree_oid,
                picked.author().clone(),
                Author::load_from_env(),
                message,
            )?;

            info!(picked = %picked_oid, commit = %commit_oid, "cherry-pick applied");
            return Ok(PickOutcome::Picked(commit_oid));
        }

        let conflicts = resolution.conflicted_paths();
        self.write_merge_state(&MergeState {
            kind: PendingKind::CherryPick,
            incoming: picked_oid.clone(),
            message,
            conflicts: conflicts.clone(),
        })?;
        writeln!(
            self.writer(),
            "error: could not apply {}... {}",
            picked_oid.to_short_oid(),
            picked.short_message()
        )?;

        Ok(PickOutcome::Conflicted(conflicts))
    }
}
