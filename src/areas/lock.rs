//! Lock files
//!
//! Two flavours share the same create-exclusive primitive:
//!
//! - [`RepositoryLock`]: held for the whole duration of a mutating operation,
//!   removed when dropped. A second process finding it fails fast with
//!   `LockHeld` instead of waiting.
//! - [`Lockfile`]: `<target>.lock` written next to a single file, then renamed
//!   over it on commit. Dropping an uncommitted lockfile rolls it back.

use crate::errors::RepositoryError;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REPOSITORY_LOCK_FILE: &str = "twig.lock";
const LOCK_SUFFIX: &str = "lock";

fn create_exclusive(path: &Path) -> anyhow::Result<File> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(file),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(RepositoryError::LockHeld(path.to_path_buf()).into())
        }
        Err(err) => Err(err).with_context(|| format!("unable to create lock {}", path.display())),
    }
}

/// Exclusive, process-wide lock on one repository
#[derive(Debug)]
pub struct RepositoryLock {
    lock_path: PathBuf,
}

impl RepositoryLock {
    pub fn acquire(control_dir: &Path) -> anyhow::Result<Self> {
        let lock_path = control_dir.join(REPOSITORY_LOCK_FILE);
        let mut file = create_exclusive(&lock_path)?;
        writeln!(file, "{}", std::process::id())?;

        debug!(lock_path = %lock_path.display(), "acquired repository lock");
        Ok(RepositoryLock { lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => debug!(lock_path = %self.lock_path.display(), "released repository lock"),
            Err(err) => warn!(
                error = %err,
                lock_path = %self.lock_path.display(),
                "failed to remove repository lock"
            ),
        }
    }
}

/// Staged replacement for a single file
#[derive(Debug)]
pub struct Lockfile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
}

impl Lockfile {
    pub fn acquire(target: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("unable to create directory {}", parent.display()))?;
        }

        let lock_path = Self::lock_path_for(target);
        let file = create_exclusive(&lock_path)?;

        Ok(Lockfile {
            target: target.to_path_buf(),
            lock_path,
            file: Some(file),
        })
    }

    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut lock_path = target.as_os_str().to_owned();
        lock_path.push(".");
        lock_path.push(LOCK_SUFFIX);

        PathBuf::from(lock_path)
    }

    pub fn write_all(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let file = self
            .file
            .as_mut()
            .with_context(|| format!("lock {} already committed", self.lock_path.display()))?;
        file.write_all(data)?;

        Ok(())
    }

    /// The open lock file, for writers that need a `File` handle
    pub fn file_mut(&mut self) -> anyhow::Result<&mut File> {
        self.file
            .as_mut()
            .with_context(|| format!("lock {} already committed", self.lock_path.display()))
    }

    /// Atomically replace the target with what was written
    pub fn commit(mut self) -> anyhow::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }

        if let Err(err) = std::fs::rename(&self.lock_path, &self.target) {
            let _ = std::fs::remove_file(&self.lock_path);
            return Err(err).with_context(|| {
                format!(
                    "unable to rename {} to {}",
                    self.lock_path.display(),
                    self.target.display()
                )
            });
        }

        Ok(())
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            if let Err(err) = std::fs::remove_file(&self.lock_path) {
                warn!(error = %err, lock_path = %self.lock_path.display(), "failed to roll back lock");
            }
        }
    }
}
