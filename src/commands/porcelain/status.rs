use crate::areas::index::Index;
use crate::areas::refs::Head;
use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::Stage;
use crate::artifacts::status::file_change::FileChangeType;
use crate::artifacts::status::status_info::{Status, StatusInfo};
use crate::errors::RepositoryError;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

impl Repository {
    pub async fn status(&mut self, porcelain: bool) -> anyhow::Result<StatusInfo> {
        self.ensure_initialized()?;

        // refreshed stat data is saved only if the lock covers the whole
        // read-modify-write; otherwise status is read-only
        let lock = match self.lock() {
            Ok(lock) => Some(lock),
            Err(err) if RepositoryError::is_lock_held(&err) => None,
            Err(err) => return Err(err),
        };

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let status = self.status_info(&mut index).await?;

        if lock.is_some() {
            index.write_if_changed()?;
        }
        drop(lock);

        if porcelain {
            self.print_porcelain_status(&status, &index)?;
        } else {
            self.print_long_status(&status, &index)?;
        }

        Ok(status)
    }

    pub(crate) async fn status_info(&self, index: &mut Index) -> anyhow::Result<StatusInfo> {
        Status::new(self).initialize(index).await
    }

    fn print_porcelain_status(&self, status: &StatusInfo, index: &Index) -> anyhow::Result<()> {
        let mut rows = status
            .changed_files
            .iter()
            .map(|(path, change)| (path.clone(), change.to_string()))
            .chain(
                status
                    .conflicted_files
                    .iter()
                    .map(|path| (path.clone(), short_conflict_code(path, index).to_string())),
            )
            .collect::<Vec<_>>();
        rows.sort();

        for (path, code) in rows {
            writeln!(self.writer(), "{} {}", code, path.display())?;
        }
        for path in &status.untracked_files {
            writeln!(self.writer(), "?? {}", path.display())?;
        }

        Ok(())
    }

    fn print_long_status(&self, status: &StatusInfo, index: &Index) -> anyhow::Result<()> {
        match self.refs().head()? {
            Head::Symbolic(branch) => writeln!(self.writer(), "On branch {branch}")?,
            Head::Detached(oid) => {
                writeln!(self.writer(), "HEAD detached at {}", oid.to_short_oid())?
            }
        }

        if let Some(state) = self.merge_state()? {
            writeln!(
                self.writer(),
                "You are in the middle of a {} of {}.",
                state.kind.as_str(),
                state.incoming.to_short_oid()
            )?;
            if status.conflicted_files.is_empty() {
                writeln!(self.writer(), "  (all conflicts fixed: run \"twig commit\")")?;
            } else {
                writeln!(self.writer(), "  (fix conflicts and run \"twig commit\")")?;
            }
        }

        if !status.conflicted_files.is_empty() {
            writeln!(self.writer(), "\nUnmerged paths:")?;
            for path in &status.conflicted_files {
                let label = format!("{:<17}", format!("{}:", long_conflict_label(path, index)));
                writeln!(self.writer(), "{:>8}{}{}", "", label.red(), path.display())?;
            }
        }

        let mut index_changes = status.index_changes().peekable();
        if index_changes.peek().is_some() {
            writeln!(self.writer(), "\nChanges to be committed:")?;
            for (path, change) in index_changes {
                writeln!(
                    self.writer(),
                    "{}{}",
                    FileChangeType::Index(change),
                    path.display()
                )?;
            }
        }

        let mut workspace_changes = status.workspace_changes().peekable();
        if workspace_changes.peek().is_some() {
            writeln!(self.writer(), "\nChanges not staged for commit:")?;
            for (path, change) in workspace_changes {
                writeln!(
                    self.writer(),
                    "{}{}",
                    FileChangeType::Workspace(change),
                    path.display()
                )?;
            }
        }

        if !status.untracked_files.is_empty() {
            writeln!(self.writer(), "\nUntracked files:")?;
            for path in &status.untracked_files {
                writeln!(
                    self.writer(),
                    "{:>8}{}",
                    "",
                    path.display().to_string().red()
                )?;
            }
        }

        if status.is_clean() {
            let trailer = if status.untracked_files.is_empty() {
                "nothing to commit, working tree clean"
            } else {
                "nothing added to commit but untracked files present"
            };
            writeln!(self.writer(), "\n{trailer}")?;
        }

        Ok(())
    }
}

fn conflict_sides(path: &Path, index: &Index) -> (bool, bool, bool) {
    let stages = index.conflict_stages(path);

    (
        stages.contains_key(&Stage::Base),
        stages.contains_key(&Stage::Ours),
        stages.contains_key(&Stage::Theirs),
    )
}

fn short_conflict_code(path: &Path, index: &Index) -> &'static str {
    match conflict_sides(path, index) {
        (false, true, true) => "AA",
        (true, false, true) => "DU",
        (true, true, false) => "UD",
        (false, true, false) => "AU",
        (false, false, true) => "UA",
        _ => "UU",
    }
}

fn long_conflict_label(path: &Path, index: &Index) -> &'static str {
    match conflict_sides(path, index) {
        (false, true, true) => "both added",
        (true, false, true) => "deleted by us",
        (true, true, false) => "deleted by them",
        (false, true, false) => "added by us",
        (false, false, true) => "added by them",
        _ => "both modified",
    }
}
