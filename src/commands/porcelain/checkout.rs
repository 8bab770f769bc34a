use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use std::io::Write;

const DETACHMENT_NOTICE: &str = r#"
You are in 'detached HEAD' state. You can look around, make experimental
changes and commit them, and you can discard any commits you make in this
state without impacting any branches by switching back to a branch.

If you want to create a new branch to retain commits you create, you may
do so (now or later) by using the branch command. Example:

    twig branch <new-branch-name>
"#;

impl Repository {
    /// Switch to a branch, or detach HEAD at any other revision
    ///
    /// With `create`, `target` names a new branch started at the current HEAD.
    pub async fn checkout(&mut self, target: &str, create: bool) -> anyhow::Result<()> {
        let _lock = self.lock()?;
        self.ensure_no_pending_merge()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        if index.has_conflicts() {
            return Err(RepositoryError::DirtyMerge(index.conflicted_paths()).into());
        }

        if create {
            return self.checkout_new_branch(target);
        }

        let was_detached = self.refs().current_branch()?.is_none();
        let current_oid = self.refs().read_head()?;
        let target_oid = Revision::try_parse(target)?.resolve(self)?;
        let target_branch = BranchName::try_parse(target.to_string())
            .ok()
            .filter(|branch| self.refs().branch_exists(branch));

        if let Some(branch) = &target_branch {
            if self.refs().is_current_branch(branch)? {
                writeln!(self.writer(), "Already on '{branch}'")?;
                return Ok(());
            }
        }

        self.migrate_working_tree(&mut index, current_oid.as_ref(), Some(&target_oid))?;
        index.write_updates()?;

        match &target_branch {
            Some(branch) => {
                self.refs().set_head_to_branch(branch)?;
                writeln!(self.writer(), "Switched to branch '{branch}'")?;
            }
            None => {
                self.refs().detach_head(&target_oid)?;
                if !was_detached {
                    writeln!(self.writer(), "Note: switching to '{target}'.\n{DETACHMENT_NOTICE}")?;
                }
                self.print_head_position("HEAD is now at", &target_oid)?;
            }
        }

        Ok(())
    }

    fn checkout_new_branch(&self, name: &str) -> anyhow::Result<()> {
        let branch = BranchName::try_parse(name.to_string())?;
        if self.refs().branch_exists(&branch) {
            return Err(RepositoryError::validation(format!(
                "a branch named '{branch}' already exists"
            )));
        }

        if let Some(head_oid) = self.refs().read_head()? {
            self.refs().create_branch(&branch, &head_oid)?;
        }
        self.refs().set_head_to_branch(&branch)?;

        writeln!(self.writer(), "Switched to a new branch '{branch}'")?;
        Ok(())
    }

    /// Move the working tree and index from one commit's tree to another's
    ///
    /// Refuses, before touching anything, when local changes would be lost.
    pub(crate) fn migrate_working_tree(
        &self,
        index: &mut Index,
        from: Option<&ObjectId>,
        to: Option<&ObjectId>,
    ) -> anyhow::Result<()> {
        let changes = self.database().tree_diff(from, to)?.into_changes();
        Migration::new(self, index, changes).apply_changes()
    }

    pub(crate) fn print_head_position(&self, message: &str, oid: &ObjectId) -> anyhow::Result<()> {
        let commit = self.database().parse_object_as_commit(oid)?;

        writeln!(
            self.writer(),
            "{} {} {}",
            message,
            oid.to_short_oid(),
            commit.short_message()
        )?;
        Ok(())
    }
}
