use crate::areas::repository::Repository;
use crate::artifacts::branch::DEFAULT_BRANCH;
use crate::artifacts::branch::branch_name::BranchName;
use crate::errors::RepositoryError;
use anyhow::Context;
use std::fs;
use std::io::Write;
use tracing::info;

impl Repository {
    pub async fn init(&mut self) -> anyhow::Result<()> {
        if self.is_initialized() {
            return Err(RepositoryError::validation(format!(
                "repository already exists at {}",
                self.control_path().display()
            )));
        }

        fs::create_dir_all(self.database().objects_path())
            .context("unable to create the objects directory")?;
        fs::create_dir_all(self.refs().heads_path())
            .context("unable to create the refs/heads directory")?;
        fs::create_dir_all(self.refs().tags_path())
            .context("unable to create the refs/tags directory")?;

        self.refs()
            .set_head_to_branch(&BranchName::try_parse(DEFAULT_BRANCH.to_string())?)
            .context("unable to create the initial HEAD")?;

        info!(path = %self.path().display(), "repository initialized");
        writeln!(
            self.writer(),
            "Initialized empty twig repository in {}",
            self.control_path().display()
        )?;

        Ok(())
    }
}
