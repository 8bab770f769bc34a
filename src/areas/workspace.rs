//! Working tree
//!
//! All paths handed in and out are relative to the repository root. The control
//! directory is never listed.

use crate::areas::repository::CONTROL_DIR;
use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use anyhow::Context;
use bytes::Bytes;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_blob(&self, path: &Path) -> anyhow::Result<Blob> {
        Ok(Blob::new(self.read_file(path)?))
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.path.join(path).symlink_metadata().is_ok()
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.path.join(path).is_dir()
    }

    /// Direct children of `dir_path` (the root when `None`), control directory excluded
    pub fn list_dir(&self, dir_path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let dir_path = match dir_path {
            Some(p) => self.path.join(p),
            None => self.path.to_path_buf(),
        };

        if !dir_path.is_dir() {
            anyhow::bail!("{} is not a directory", dir_path.display());
        }

        let mut entries = std::fs::read_dir(&dir_path)
            .with_context(|| format!("unable to list {}", dir_path.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.relative_unignored(&entry.path()))
            .collect::<Vec<_>>();
        entries.sort();

        Ok(entries)
    }

    /// Every file at or below `root_path` (the whole tree when `None`)
    pub fn list_files(&self, root_path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let root_path = match root_path {
            Some(p) => self.path.join(p),
            None => self.path.to_path_buf(),
        };

        if !root_path.exists() {
            return Err(crate::errors::RepositoryError::not_found(format!(
                "pathspec '{}'",
                root_path
                    .strip_prefix(self.path.as_ref())
                    .unwrap_or(&root_path)
                    .display()
            )));
        }

        let mut files = WalkDir::new(&root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_control_path(entry.path()))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.relative_unignored(entry.path()))
            .collect::<Vec<_>>();
        files.sort();

        Ok(files)
    }

    fn is_control_path(&self, path: &Path) -> bool {
        path.strip_prefix(self.path.as_ref())
            .ok()
            .and_then(|relative| relative.components().next())
            .is_some_and(|component| component == Component::Normal(OsStr::new(CONTROL_DIR)))
    }

    fn relative_unignored(&self, path: &Path) -> Option<PathBuf> {
        if self.is_control_path(path) {
            return None;
        }

        let relative = path.strip_prefix(self.path.as_ref()).ok()?;
        if relative.as_os_str().is_empty() {
            None
        } else {
            Some(relative.to_path_buf())
        }
    }

    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let full_path = self.path.join(file_path);
        let content = std::fs::read(&full_path)
            .with_context(|| format!("unable to read {}", file_path.display()))?;

        Ok(Bytes::from(content))
    }

    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<EntryMetadata> {
        let full_path = self.path.join(file_path);
        let metadata = std::fs::metadata(&full_path)
            .with_context(|| format!("unable to stat {}", file_path.display()))?;

        (full_path.as_path(), metadata).try_into()
    }

    /// Replace whatever is at `file_path` with a file holding `data`
    pub fn write_file(&self, file_path: &Path, data: &[u8], mode: EntryMode) -> anyhow::Result<()> {
        let path = self.path.join(file_path);

        if let Some(parent) = file_path.parent() {
            self.make_directory(parent)?;
        }

        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("unable to remove directory {}", file_path.display()))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("unable to open {}", file_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("unable to write {}", file_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(if mode.is_executable() {
                0o755
            } else {
                0o644
            });
            std::fs::set_permissions(&path, permissions)
                .with_context(|| format!("unable to set mode of {}", file_path.display()))?;
        }

        Ok(())
    }

    /// Remove a file, then any parent directories it leaves empty
    pub fn remove_file(&self, file_path: &Path) -> anyhow::Result<()> {
        let path = self.path.join(file_path);

        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(&path)
                .with_context(|| format!("unable to remove {}", file_path.display()))?,
            Ok(_) => std::fs::remove_file(&path)
                .with_context(|| format!("unable to remove {}", file_path.display()))?,
            Err(_) => return Ok(()),
        }

        for parent in file_path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }
            let full_parent = self.path.join(parent);
            let is_empty = full_parent
                .read_dir()
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                break;
            }
            std::fs::remove_dir(&full_parent)
                .with_context(|| format!("unable to remove directory {}", parent.display()))?;
        }

        Ok(())
    }

    // Deletions run first, then directories are removed deepest-first; creations
    // make directories outermost-first before files are written.
    pub fn apply_migration(&self, migration: &Migration) -> anyhow::Result<()> {
        self.apply_migration_action_set(migration, ActionType::Delete)?;
        for dir_path in migration.rmdirs().iter().rev() {
            self.remove_directory_if_empty(dir_path)?;
        }

        for dir_path in migration.mkdirs() {
            self.make_directory(dir_path)?;
        }
        self.apply_migration_action_set(migration, ActionType::Modify)?;
        self.apply_migration_action_set(migration, ActionType::Add)?;

        Ok(())
    }

    fn apply_migration_action_set(
        &self,
        migration: &Migration,
        action: ActionType,
    ) -> anyhow::Result<()> {
        let Some(actions) = migration.actions().get(&action) else {
            return Ok(());
        };

        for (file_path, entry) in actions {
            match (&action, entry) {
                (ActionType::Delete, _) => {
                    let path = self.path.join(file_path);
                    if path.is_file() {
                        std::fs::remove_file(&path)
                            .with_context(|| format!("unable to remove {}", file_path.display()))?;
                    }
                }
                (ActionType::Add | ActionType::Modify, Some(entry)) => {
                    let data = migration.load_blob_data(&entry.oid)?;
                    self.write_file(file_path, &data, entry.mode)?;
                }
                (ActionType::Add | ActionType::Modify, None) => {
                    anyhow::bail!("no target entry for {}", file_path.display())
                }
            }
        }

        Ok(())
    }

    fn remove_directory_if_empty(&self, dir_path: &Path) -> anyhow::Result<()> {
        let dir_path = self.path.join(dir_path);

        let is_empty = dir_path
            .read_dir()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            std::fs::remove_dir(&dir_path)
                .with_context(|| format!("unable to remove directory {}", dir_path.display()))?;
        }

        Ok(())
    }

    fn make_directory(&self, dir_path: &Path) -> anyhow::Result<()> {
        if dir_path.as_os_str().is_empty() {
            return Ok(());
        }

        // a file may be standing where a directory is needed
        for ancestor in dir_path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            let full_path = self.path.join(ancestor);
            if full_path.is_file() {
                std::fs::remove_file(&full_path)
                    .with_context(|| format!("unable to remove {}", ancestor.display()))?;
            }
        }

        let full_path = self.path.join(dir_path);
        std::fs::create_dir_all(&full_path)
            .with_context(|| format!("unable to create directory {}", dir_path.display()))
    }
}
