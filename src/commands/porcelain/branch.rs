use crate::areas::refs::Head;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::branch::revision::Revision;
use crate::errors::RepositoryError;
use colored::Colorize;
use std::io::Write;

impl Repository {
    pub async fn branch(&mut self, branch_name: &str, source: Option<&str>) -> anyhow::Result<()> {
        let _lock = self.lock()?;

        let branch_name = BranchName::try_parse(branch_name.to_string())?;
        let source_oid = Revision::try_parse(source.unwrap_or("HEAD"))?.resolve(self)?;

        self.refs().create_branch(&branch_name, &source_oid)
    }

    pub async fn list_branches(&mut self) -> anyhow::Result<()> {
        self.ensure_initialized()?;

        let head = self.refs().head()?;
        if let Head::Detached(oid) = &head {
            writeln!(
                self.writer(),
                "* {}",
                format!("(HEAD detached at {})", oid.to_short_oid()).green()
            )?;
        }

        for branch in self.refs().list_branches()? {
            if head.branch() == Some(&branch) {
                writeln!(self.writer(), "* {}", branch.to_string().green())?;
            } else {
                writeln!(self.writer(), "  {branch}")?;
            }
        }

        Ok(())
    }

    /// Delete branches, refusing those whose commits HEAD does not contain unless forced
    pub async fn delete_branches(&mut self, branch_names: &[String], force: bool) -> anyhow::Result<()> {
        let _lock = self.lock()?;

        for branch_name in branch_names {
            let branch_name = BranchName::try_parse(branch_name.to_string())?;
            if !self.refs().branch_exists(&branch_name) {
                return Err(RepositoryError::not_found(format!("branch '{branch_name}'")));
            }

            if !force {
                self.ensure_fully_merged(&branch_name)?;
            }

            let oid = self.refs().delete_branch(&branch_name)?;
            writeln!(
                self.writer(),
                "Deleted branch {} (was {}).",
                branch_name,
                oid.to_short_oid()
            )?;
        }

        Ok(())
    }

    fn ensure_fully_merged(&self, branch_name: &BranchName) -> anyhow::Result<()> {
        let Some(branch_oid) = self.refs().read_ref(&SymRefName::branch(branch_name))? else {
            return Ok(());
        };
        let Some(head_oid) = self.refs().read_head()? else {
            return Ok(());
        };

        if self.is_ancestor(&branch_oid, &head_oid)? {
            Ok(())
        } else {
            Err(RepositoryError::validation(format!(
                "the branch '{branch_name}' is not fully merged"
            )))
        }
    }
}
