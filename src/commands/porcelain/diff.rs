use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::diff::diff_algorithm::EditKind;
use crate::artifacts::diff::diff_target::DiffTarget;
use crate::artifacts::diff::hunk::{ContentDiff, Hunk};
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::status_info::StatusInfo;
use crate::errors::RepositoryError;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

impl Repository {
    /// Unstaged changes (working tree against index), or staged ones with `cached`
    /// (index against HEAD)
    pub async fn diff(&mut self, cached: bool) -> anyhow::Result<()> {
        self.ensure_initialized()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let status = self.status_info(&mut index).await?;

        if cached {
            self.diff_head_index(&status, &index)
        } else {
            self.diff_index_workspace(&status, &index)
        }
    }

    fn diff_index_workspace(&self, status: &StatusInfo, index: &Index) -> anyhow::Result<()> {
        for (file, change) in status.workspace_changes() {
            let a = self.index_target(file, index)?;
            let b = match change {
                WorkspaceChangeType::Modified => DiffTarget::from_file(file, self.workspace())?,
                WorkspaceChangeType::Deleted => DiffTarget::from_nothing(file)?,
                WorkspaceChangeType::None | WorkspaceChangeType::Untracked => continue,
            };

            self.print_diff(&a, &b)?;
        }

        Ok(())
    }

    fn diff_head_index(&self, status: &StatusInfo, index: &Index) -> anyhow::Result<()> {
        for (file, change) in status.index_changes() {
            let (a, b) = match change {
                IndexChangeType::Added => {
                    (DiffTarget::from_nothing(file)?, self.index_target(file, index)?)
                }
                IndexChangeType::Modified => {
                    (self.head_target(file, status)?, self.index_target(file, index)?)
                }
                IndexChangeType::Deleted => {
                    (self.head_target(file, status)?, DiffTarget::from_nothing(file)?)
                }
                IndexChangeType::None => continue,
            };

            self.print_diff(&a, &b)?;
        }

        Ok(())
    }

    fn index_target(&self, file: &Path, index: &Index) -> anyhow::Result<DiffTarget> {
        let entry = index
            .entry_by_path(file)
            .ok_or_else(|| RepositoryError::not_found(format!("index entry for '{}'", file.display())))?;

        DiffTarget::from_entry(file, &entry.database_entry(), self.database())
    }

    fn head_target(&self, file: &Path, status: &StatusInfo) -> anyhow::Result<DiffTarget> {
        let entry = status
            .head_tree
            .get(file)
            .ok_or_else(|| RepositoryError::not_found(format!("'{}' in HEAD", file.display())))?;

        DiffTarget::from_entry(file, entry, self.database())
    }

    fn print_diff(&self, a: &DiffTarget, b: &DiffTarget) -> anyhow::Result<()> {
        if a.oid == b.oid && a.mode == b.mode {
            return Ok(());
        }

        writeln!(
            self.writer(),
            "{}",
            format!(
                "diff --git {} {}",
                Path::new("a").join(&a.file).display(),
                Path::new("b").join(&b.file).display()
            )
            .bold()
        )?;
        self.print_diff_mode(a, b)?;
        self.print_diff_content(a, b)?;

        Ok(())
    }

    fn print_diff_mode(&self, a: &DiffTarget, b: &DiffTarget) -> anyhow::Result<()> {
        if a.mode.is_none() {
            writeln!(
                self.writer(),
                "{}",
                format!("new file mode {}", b.pretty_mode()).bold()
            )?;
        } else if b.mode.is_none() {
            writeln!(
                self.writer(),
                "{}",
                format!("deleted file mode {}", a.pretty_mode()).bold()
            )?;
        } else if a.mode != b.mode {
            writeln!(
                self.writer(),
                "{}",
                format!("old mode {}", a.pretty_mode()).bold()
            )?;
            writeln!(
                self.writer(),
                "{}",
                format!("new mode {}", b.pretty_mode()).bold()
            )?;
        }

        Ok(())
    }

    fn print_diff_content(&self, a: &DiffTarget, b: &DiffTarget) -> anyhow::Result<()> {
        if a.oid == b.oid {
            return Ok(());
        }

        let mut oid_range = format!("index {}..{}", a.oid.to_short_oid(), b.oid.to_short_oid());
        if a.mode == b.mode {
            oid_range.push_str(&format!(" {}", a.pretty_mode()));
        }
        writeln!(self.writer(), "{}", oid_range.bold())?;

        let hunks = match a.content_diff(b) {
            ContentDiff::Unchanged => return Ok(()),
            ContentDiff::Binary => {
                writeln!(
                    self.writer(),
                    "Binary files {} and {} differ",
                    a.diff_path("a").display(),
                    b.diff_path("b").display()
                )?;
                return Ok(());
            }
            ContentDiff::Text(hunks) => hunks,
        };

        writeln!(
            self.writer(),
            "{}",
            format!("--- {}", a.diff_path("a").display()).bold()
        )?;
        writeln!(
            self.writer(),
            "{}",
            format!("+++ {}", b.diff_path("b").display()).bold()
        )?;

        for hunk in &hunks {
            self.print_diff_hunk(hunk)?;
        }

        Ok(())
    }

    fn print_diff_hunk(&self, hunk: &Hunk) -> anyhow::Result<()> {
        writeln!(self.writer(), "{}", hunk.header().cyan())?;

        for edit in &hunk.edits {
            let line = edit.to_string();
            match edit.kind {
                EditKind::Equal => writeln!(self.writer(), "{line}")?,
                EditKind::Delete => writeln!(self.writer(), "{}", line.red())?,
                EditKind::Insert => writeln!(self.writer(), "{}", line.green())?,
            }
            if !edit.value.has_newline() {
                writeln!(self.writer(), "{NO_NEWLINE_MARKER}")?;
            }
        }

        Ok(())
    }
}
