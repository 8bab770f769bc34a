use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::errors::RepositoryError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Path argument relative to the repository root, with `./` segments dropped
pub(crate) fn pathspec(path: &str) -> PathBuf {
    let normalized = Path::new(path)
        .components()
        .filter(|component| *component != Component::CurDir)
        .collect::<PathBuf>();

    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

impl Repository {
    /// Stage files, or every file below a directory
    ///
    /// Tracked files that disappeared from under a given path are untracked,
    /// so deletions can be staged the same way as edits.
    pub async fn add(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let _lock = self.lock()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        for path in paths {
            self.stage_path(&mut index, &pathspec(path))?;
        }

        index.write_updates()?;

        Ok(())
    }

    pub async fn unstage(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let _lock = self.lock()?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        for path in paths {
            let path = pathspec(path);
            if index.entries_under_path(&path).is_empty() {
                return Err(RepositoryError::not_found(format!(
                    "index entry for '{}'",
                    path.display()
                )));
            }
            index.remove(&path);
        }

        index.write_updates()?;

        Ok(())
    }

    fn stage_path(&self, index: &mut Index, path: &Path) -> anyhow::Result<()> {
        let workspace = self.workspace();

        let vanished = index
            .entries_under_path(path)
            .into_iter()
            .filter(|tracked| !workspace.exists(tracked))
            .collect::<Vec<_>>();

        if !workspace.exists(path) && vanished.is_empty() {
            return Err(RepositoryError::not_found(format!(
                "pathspec '{}'",
                path.display()
            )));
        }

        for tracked in &vanished {
            index.remove(tracked);
        }
        if !workspace.exists(path) {
            return Ok(());
        }

        let files = workspace.list_files(Some(path))?;
        for file in &files {
            let blob = workspace.parse_blob(file)?;
            let stat = workspace.stat_file(file)?;
            let blob_id = self.database().store(&blob)?;

            index.add(IndexEntry::new(file.clone(), blob_id, stat));
        }

        debug!(
            path = %path.display(),
            staged = files.len(),
            removed = vanished.len(),
            "path staged"
        );
        Ok(())
    }
}
