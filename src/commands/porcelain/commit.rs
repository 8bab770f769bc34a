use crate::areas::repository::Repository;
use crate::artifacts::merge::merge_state::PendingKind;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use std::io::Write;
use tracing::info;

impl Repository {
    /// Record the index as a commit on top of HEAD
    ///
    /// During a pending merge or cherry-pick the commit concludes it: the recorded
    /// message is used when none is given, and a merge gains its second parent.
    pub async fn commit(
        &mut self,
        message: Option<&str>,
        author: Option<&str>,
    ) -> anyhow::Result<ObjectId> {
        let _lock = self.lock()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        if index.has_conflicts() {
            return Err(RepositoryError::DirtyMerge(index.conflicted_paths()).into());
        }
        if index.tracked_entries().next().is_none() {
            return Err(RepositoryError::validation(
                "nothing to commit: the index is empty",
            ));
        }

        let merge_state = self.merge_state()?;
        let message = message
            .map(str::to_string)
            .or_else(|| merge_state.as_ref().map(|state| state.message.clone()))
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .ok_or_else(|| RepositoryError::validation("aborting commit due to empty commit message"))?;

        let parent = self.refs().read_head()?;
        let tree_oid = index.snapshot_to_tree(self.database())?;

        if merge_state.is_none() {
            if let Some(parent) = &parent {
                if self.database().commit_tree_oid(parent)? == tree_oid {
                    return Err(RepositoryError::validation(
                        "nothing to commit, working tree clean",
                    ));
                }
            }
        }

        let committer = Author::load_from_env();
        let author_signature = match (author, &merge_state) {
            (Some(identity), _) => committer.clone().with_identity(identity)?,
            (None, Some(state)) if state.kind == PendingKind::CherryPick => self
                .database()
                .parse_object_as_commit(&state.incoming)?
                .author()
                .clone(),
            (None, _) => committer.clone(),
        };

        let parents = parent
            .iter()
            .cloned()
            .chain(merge_state.iter().flat_map(|state| state.extra_parents()))
            .collect::<Vec<_>>();

        let commit_oid =
            self.record_commit(parents, tree_oid, author_signature, committer, message)?;

        if merge_state.is_some() {
            self.clear_merge_state()?;
        }

        Ok(commit_oid)
    }

    /// Store a commit and advance HEAD to it
    ///
    /// The first parent is HEAD as observed by the caller; HEAD is only moved if it
    /// still points there.
    pub(crate) fn record_commit(
        &self,
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Author,
        committer: Author,
        message: String,
    ) -> anyhow::Result<ObjectId> {
        let expected_head = parents.first().cloned();
        let commit = Commit::new(parents, tree_oid, author, committer, message);

        let commit_oid = self.database().store(&commit)?;
        let moved_ref = self
            .refs()
            .update_head(expected_head.as_ref(), &commit_oid)?;

        info!(r#ref = %moved_ref, oid = %commit_oid, parents = commit.parents().len(), "commit recorded");
        self.print_commit_summary(&commit_oid, &commit)?;

        Ok(commit_oid)
    }

    fn print_commit_summary(&self, commit_oid: &ObjectId, commit: &Commit) -> anyhow::Result<()> {
        let head = self.refs().head()?.describe();
        let root = if commit.parents().is_empty() {
            " (root-commit)"
        } else {
            ""
        };

        writeln!(
            self.writer(),
            "[{}{} {}] {}",
            head,
            root,
            commit_oid.to_short_oid(),
            commit.short_message()
        )?;

        Ok(())
    }
}
