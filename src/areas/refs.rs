//! References (branches, tags, HEAD)
//!
//! References are human-readable names pointing at objects:
//! - Direct: the file holds a 40-character object id
//! - Symbolic: the file holds `ref: <path>` (only HEAD is ever symbolic)
//!
//! ## Layout
//!
//! - `HEAD`: the current branch (`ref: refs/heads/<name>`) or a detached commit id
//! - `refs/heads/*`: branch tips
//! - `refs/tags/*`: lightweight tags and annotated tag objects
//!
//! ## Updates
//!
//! Every write goes through a `<ref>.lock` file that is renamed over the ref.
//! Moving a ref is a compare-and-swap: the value read under the lock must match
//! what the caller last observed, otherwise the update fails with `RefConflict`.

use crate::areas::lock::Lockfile;
use crate::artifacts::branch::branch_name::{BranchName, HEAD_REF_NAME, HEADS_PREFIX, SymRefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use anyhow::Context;
use derive_new::new;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Current position in history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// On a branch, which may not have any commit yet
    Symbolic(BranchName),
    Detached(ObjectId),
}

impl Head {
    pub fn branch(&self) -> Option<&BranchName> {
        match self {
            Head::Symbolic(branch) => Some(branch),
            Head::Detached(_) => None,
        }
    }

    /// `master`, or `detached HEAD` when not on a branch
    pub fn describe(&self) -> String {
        match self {
            Head::Symbolic(branch) => branch.to_string(),
            Head::Detached(_) => "detached HEAD".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum SymRefOrOid {
    SymRef(SymRefName),
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {}", path.display()))?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        match regex::Regex::new(SYMREF_REGEX)?.captures(content) {
            Some(symref_match) => Ok(Some(SymRefOrOid::SymRef(SymRefName::new(
                symref_match[1].to_string(),
            )))),
            None => Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(content.to_string())?))),
        }
    }
}

#[derive(Debug, new)]
pub struct Refs {
    /// Control directory holding HEAD and refs/
    path: Box<Path>,
}

impl Refs {
    pub fn head(&self) -> anyhow::Result<Head> {
        match SymRefOrOid::read(&self.head_path())? {
            Some(SymRefOrOid::SymRef(target)) => {
                Ok(Head::Symbolic(BranchName::try_parse_sym_ref_name(&target)?))
            }
            Some(SymRefOrOid::Oid(oid)) => Ok(Head::Detached(oid)),
            None => Err(RepositoryError::not_found(HEAD_REF_NAME)),
        }
    }

    /// Commit HEAD points at, or None on an unborn branch
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        match self.head()? {
            Head::Symbolic(branch) => self.read_ref(&SymRefName::branch(&branch)),
            Head::Detached(oid) => Ok(Some(oid)),
        }
    }

    pub fn resolve_head(&self) -> anyhow::Result<ObjectId> {
        self.read_head()?
            .ok_or_else(|| RepositoryError::not_found("commit at HEAD"))
    }

    pub fn current_branch(&self) -> anyhow::Result<Option<BranchName>> {
        Ok(self.head()?.branch().cloned())
    }

    pub fn is_current_branch(&self, branch_name: &BranchName) -> anyhow::Result<bool> {
        Ok(self.current_branch()?.as_ref() == Some(branch_name))
    }

    pub fn set_head_to_branch(&self, branch_name: &BranchName) -> anyhow::Result<()> {
        let content = format!("ref: {}\n", SymRefName::branch(branch_name));
        self.write_ref_file(&self.head_path(), content.as_bytes())?;

        info!(branch = %branch_name, "HEAD attached");
        Ok(())
    }

    pub fn detach_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        self.write_ref_file(&self.head_path(), format!("{oid}\n").as_bytes())?;

        info!(oid = %oid, "HEAD detached");
        Ok(())
    }

    /// Advance whatever HEAD stands for: the current branch, or HEAD itself when detached
    ///
    /// Returns the name of the ref that moved.
    pub fn update_head(
        &self,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> anyhow::Result<SymRefName> {
        let target = match self.head()? {
            Head::Symbolic(branch) => SymRefName::branch(&branch),
            Head::Detached(_) => SymRefName::head(),
        };
        self.compare_and_swap(&target, expected, new)?;

        Ok(target)
    }

    pub fn read_ref(&self, name: &SymRefName) -> anyhow::Result<Option<ObjectId>> {
        match SymRefOrOid::read(&self.ref_path(name))? {
            Some(SymRefOrOid::SymRef(target)) => self.read_ref(&target),
            Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
            None => Ok(None),
        }
    }

    /// Point `name` at `new`, provided it still holds `expected`
    ///
    /// `expected == None` asserts that the ref does not exist yet.
    pub fn compare_and_swap(
        &self,
        name: &SymRefName,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> anyhow::Result<()> {
        let path = self.ref_path(name);
        let mut lock = Lockfile::acquire(&path)?;

        let actual = match SymRefOrOid::read(&path)? {
            Some(SymRefOrOid::Oid(oid)) => Some(oid),
            Some(SymRefOrOid::SymRef(target)) => {
                return Err(RepositoryError::validation(format!(
                    "{name} is a symbolic ref to {target}"
                )));
            }
            None => None,
        };

        if actual.as_ref() != expected {
            return Err(RepositoryError::RefConflict {
                name: name.to_string(),
                expected: describe_value(expected),
                actual: describe_value(actual.as_ref()),
            }
            .into());
        }

        lock.write_all(format!("{new}\n").as_bytes())?;
        lock.commit()?;

        info!(
            r#ref = %name,
            old = %describe_value(expected),
            new = %new,
            "ref updated"
        );
        Ok(())
    }

    fn delete_ref(&self, name: &SymRefName) -> anyhow::Result<ObjectId> {
        let path = self.ref_path(name);
        let lock = Lockfile::acquire(&path)?;

        let oid = self
            .read_ref(name)?
            .ok_or_else(|| RepositoryError::not_found(name.short_name()))?;
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to delete ref file at {}", path.display()))?;
        drop(lock);
        self.prune_empty_parent_dirs(&path)?;

        info!(r#ref = %name, old = %oid, "ref deleted");
        Ok(oid)
    }

    pub fn create_branch(&self, name: &BranchName, source_oid: &ObjectId) -> anyhow::Result<()> {
        if self.branch_exists(name) {
            return Err(RepositoryError::validation(format!(
                "a branch named '{name}' already exists"
            )));
        }

        self.compare_and_swap(&SymRefName::branch(name), None, source_oid)
    }

    pub fn branch_exists(&self, name: &BranchName) -> bool {
        self.ref_path(&SymRefName::branch(name)).is_file()
    }

    pub fn delete_branch(&self, name: &BranchName) -> anyhow::Result<ObjectId> {
        if self.is_current_branch(name)? {
            return Err(RepositoryError::validation(format!(
                "cannot delete branch '{name}' checked out at HEAD"
            )));
        }

        self.delete_ref(&SymRefName::branch(name))
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<BranchName>> {
        self.list_refs(&self.heads_path())?
            .iter()
            .map(BranchName::try_parse_sym_ref_name)
            .collect()
    }

    pub fn create_tag(&self, name: &BranchName, target: &ObjectId) -> anyhow::Result<()> {
        if self.ref_path(&SymRefName::tag(name)).is_file() {
            return Err(RepositoryError::validation(format!(
                "tag '{name}' already exists"
            )));
        }

        self.compare_and_swap(&SymRefName::tag(name), None, target)
    }

    pub fn delete_tag(&self, name: &BranchName) -> anyhow::Result<ObjectId> {
        self.delete_ref(&SymRefName::tag(name))
    }

    /// Tags in name order, with the object each one names
    pub fn list_tags(&self) -> anyhow::Result<Vec<(BranchName, ObjectId)>> {
        let tags_path = self.tags_path();

        self.list_refs(&tags_path)?
            .into_iter()
            .filter_map(|sym_ref| {
                let name = sym_ref
                    .as_ref_path()
                    .strip_prefix(crate::artifacts::branch::TAGS_PREFIX)?
                    .to_string();
                Some((name, sym_ref))
            })
            .map(|(name, sym_ref)| {
                let oid = self
                    .read_ref(&sym_ref)?
                    .ok_or_else(|| RepositoryError::not_found(sym_ref.short_name()))?;
                Ok((BranchName::try_parse(name)?, oid))
            })
            .collect()
    }

    /// Every ref under `refs/`, plus HEAD, keyed by the object it points at
    pub fn reverse_refs(&self) -> anyhow::Result<HashMap<ObjectId, Vec<SymRefName>>> {
        let mut reverse_refs = HashMap::<ObjectId, Vec<SymRefName>>::new();

        for sym_ref in self.list_all_refs()? {
            if let Some(oid) = self.read_ref(&sym_ref)? {
                reverse_refs.entry(oid).or_default().push(sym_ref);
            }
        }

        Ok(reverse_refs)
    }

    pub fn list_all_refs(&self) -> anyhow::Result<Vec<SymRefName>> {
        Ok(self
            .list_refs(&self.refs_path())?
            .into_iter()
            .chain(std::iter::once(SymRefName::head()))
            .collect())
    }

    fn list_refs(&self, path: &Path) -> anyhow::Result<Vec<SymRefName>> {
        let mut refs = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_none_or(|ext| ext != "lock"))
            .filter_map(|entry| {
                let relative_path = entry.path().strip_prefix(self.path.as_ref()).ok()?;
                Some(SymRefName::new(relative_path.to_string_lossy().to_string()))
            })
            .collect::<Vec<_>>();
        refs.sort();

        Ok(refs)
    }

    fn write_ref_file(&self, path: &Path, content: &[u8]) -> anyhow::Result<()> {
        let mut lock = Lockfile::acquire(path)?;
        lock.write_all(content)?;
        lock.commit()
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        let stop_dirs = [self.heads_path(), self.tags_path()];
        let Some(parent) = path.parent() else {
            return Ok(());
        };

        if !stop_dirs.iter().any(|stop| stop == parent)
            && parent.starts_with(self.refs_path())
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent).with_context(|| {
                format!("failed to remove empty ref directory at {}", parent.display())
            })?;
            self.prune_empty_parent_dirs(parent)?;
        }

        Ok(())
    }

    fn ref_path(&self, name: &SymRefName) -> PathBuf {
        self.path.join(name.as_ref_path())
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.path.join(HEADS_PREFIX.trim_end_matches('/'))
    }

    pub fn tags_path(&self) -> PathBuf {
        self.path
            .join(crate::artifacts::branch::TAGS_PREFIX.trim_end_matches('/'))
    }
}

fn describe_value(oid: Option<&ObjectId>) -> String {
    oid.map(ObjectId::to_string)
        .unwrap_or_else(|| "nothing".to_string())
}
