use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::merge::StashPopOutcome;
use crate::artifacts::merge::resolution::MergeResolution;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::errors::RepositoryError;
use std::io::Write;
use tracing::info;

impl Repository {
    /// Shelve the index and tracked working tree changes, then reset to HEAD
    ///
    /// A stash is a commit whose parents are HEAD and a commit of the index, and
    /// whose tree is the working tree state of every tracked file.
    pub async fn stash_save(&mut self, message: Option<&str>) -> anyhow::Result<ObjectId> {
        let _lock = self.lock()?;
        self.ensure_no_pending_merge()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        if index.has_conflicts() {
            return Err(RepositoryError::DirtyMerge(index.conflicted_paths()).into());
        }

        let head_oid = self.refs().resolve_head()?;
        let status = self.status_info(&mut index).await?;
        if status.is_clean() {
            return Err(RepositoryError::validation("no local changes to save"));
        }

        let head_commit = self.database().parse_object_as_commit(&head_oid)?;
        let branch = self.refs().head()?.describe();
        let summary = format!(
            "{}: {} {}",
            branch,
            head_oid.to_short_oid(),
            head_commit.short_message()
        );
        let message = match message {
            Some(message) => format!("On {branch}: {}", message.trim()),
            None => format!("WIP on {summary}"),
        };
        let author = Author::load_from_env();

        let index_tree = index.snapshot_to_tree(self.database())?;
        let index_commit = Commit::new(
            vec![head_oid.clone()],
            index_tree,
            author.clone(),
            author.clone(),
            format!("index on {summary}"),
        );
        let index_commit_oid = self.database().store(&index_commit)?;

        let worktree_tree = self.snapshot_working_tree(&index)?;
        let stash_commit = Commit::new(
            vec![head_oid.clone(), index_commit_oid],
            worktree_tree,
            author.clone(),
            author,
            message.clone(),
        );
        let stash_oid = self.database().store(&stash_commit)?;

        let mut stack = self.stash_stack()?;
        stack.insert(0, stash_oid.clone());
        self.write_stash_stack(&stack)?;

        self.restore_to_commit(&mut index, Some(&head_oid))?;
        index.write_updates()?;

        info!(stash = %stash_oid, depth = stack.len(), "stash saved");
        writeln!(
            self.writer(),
            "Saved working directory and index state {message}"
        )?;

        Ok(stash_oid)
    }

    pub async fn stash_list(&mut self) -> anyhow::Result<()> {
        self.ensure_initialized()?;

        for (position, stash_oid) in self.stash_stack()?.iter().enumerate() {
            let commit = self.database().parse_object_as_commit(stash_oid)?;
            writeln!(
                self.writer(),
                "stash@{{{}}}: {}",
                position,
                commit.short_message()
            )?;
        }

        Ok(())
    }

    /// Re-apply the newest stash on top of HEAD
    ///
    /// The stash is merged three ways against the commit it was taken on. On
    /// conflict the entry stays on the stack so the pop can be retried.
    pub async fn stash_pop(&mut self) -> anyhow::Result<StashPopOutcome> {
        let _lock = self.lock()?;
        self.ensure_no_pending_merge()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        self.ensure_index_matches_head(&index)?;

        let mut stack = self.stash_stack()?;
        let Some(stash_oid) = stack.first().cloned() else {
            return Err(RepositoryError::not_found("stash entry"));
        };

        let stash_commit = self.database().parse_object_as_commit(&stash_oid)?;
        let base = self.database().commit_tree_map(stash_commit.parent())?;
        let ours = self.head_tree_map()?;
        let theirs = self.database().flatten_tree(stash_commit.tree_oid())?;

        let resolution = MergeResolution::resolve(&base, &ours, &theirs)?;
        self.materialize_merge(&mut index, &resolution, &ours)?;
        index.write_updates()?;

        if !resolution.is_clean() {
            writeln!(
                self.writer(),
                "The stash entry is kept in case you need it again."
            )?;
            return Ok(StashPopOutcome::Conflicted(resolution.conflicted_paths()));
        }

        stack.remove(0);
        self.write_stash_stack(&stack)?;

        info!(stash = %stash_oid, depth = stack.len(), "stash applied and dropped");
        writeln!(self.writer(), "Dropped stash@{{0}} ({stash_oid})")?;

        Ok(StashPopOutcome::Applied(stash_oid))
    }

    /// Tree of every tracked file as it currently is on disk
    fn snapshot_working_tree(&self, index: &Index) -> anyhow::Result<ObjectId> {
        let workspace = self.workspace();
        let mut entries = Vec::new();

        for entry in index.tracked_entries() {
            if !workspace.exists(&entry.name) || workspace.is_dir(&entry.name) {
                continue;
            }

            let blob = workspace.parse_blob(&entry.name)?;
            let stat = workspace.stat_file(&entry.name)?;
            let blob_id = self.database().store(&blob)?;
            entries.push(IndexEntry::new(entry.name.clone(), blob_id, stat));
        }

        let root = Tree::build(&entries)?;
        root.traverse(&mut |tree| self.database().store(tree).map(|_| ()))?;

        self.database().store(&root)
    }
}
