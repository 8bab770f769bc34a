use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::lock::{Lockfile, RepositoryLock};
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::log::rev_list;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::merge::merge_state::MergeState;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use anyhow::Context;
use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub const CONTROL_DIR: &str = ".twig";
pub const OBJECTS_DIR: &str = "objects";
pub const INDEX_FILE: &str = "index";
pub const MERGE_STATE_FILE: &str = "MERGE_STATE";
pub const STASH_FILE: &str = "stash";

/// Explicit handle on one repository: its object store, index, refs and working tree
///
/// Nothing is cached across operations except parsed commit headers; every
/// operation reads the state it needs from disk and writes it back atomically.
pub struct Repository {
    path: Box<Path>,
    writer: RefCell<Box<dyn std::io::Write>>,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    pub fn new(path: impl AsRef<Path>, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("unable to create {}", path.display()))?;
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("unable to resolve {}", path.display()))?;
        let control_path = path.join(CONTROL_DIR);

        Ok(Repository {
            writer: RefCell::new(writer),
            index: Arc::new(Mutex::new(Index::new(
                control_path.join(INDEX_FILE).into_boxed_path(),
            ))),
            database: Database::new(control_path.join(OBJECTS_DIR).into_boxed_path()),
            workspace: Workspace::new(path.clone().into_boxed_path()),
            refs: Refs::new(control_path.into_boxed_path()),
            path: path.into_boxed_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn control_path(&self) -> PathBuf {
        self.path.join(CONTROL_DIR)
    }

    pub fn is_initialized(&self) -> bool {
        self.refs.head_path().is_file()
    }

    pub fn ensure_initialized(&self) -> anyhow::Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(RepositoryError::not_found(format!(
                "twig repository at {}",
                self.path.display()
            )))
        }
    }

    /// Take the repository-wide write lock for the rest of the operation
    pub fn lock(&self) -> anyhow::Result<RepositoryLock> {
        self.ensure_initialized()?;
        RepositoryLock::acquire(&self.control_path())
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Flattened tree of the commit at HEAD, empty on an unborn branch
    pub fn head_tree_map(&self) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        self.database
            .commit_tree_map(self.refs.read_head()?.as_ref())
    }

    pub fn merge_base(
        &self,
        source: &ObjectId,
        target: &ObjectId,
    ) -> anyhow::Result<Option<ObjectId>> {
        BCAFinder::new(|oid: &ObjectId| self.database.load_slim_commit(oid))
            .find_best_common_ancestor(source, target)
    }

    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        rev_list::is_ancestor(
            |oid: &ObjectId| self.database.load_slim_commit(oid),
            ancestor,
            descendant,
        )
    }

    fn merge_state_path(&self) -> PathBuf {
        self.control_path().join(MERGE_STATE_FILE)
    }

    pub fn merge_state(&self) -> anyhow::Result<Option<MergeState>> {
        match std::fs::read_to_string(self.merge_state_path()) {
            Ok(content) => Ok(Some(MergeState::parse(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context("unable to read merge state"),
        }
    }

    pub fn write_merge_state(&self, state: &MergeState) -> anyhow::Result<()> {
        let mut lockfile = Lockfile::acquire(&self.merge_state_path())?;
        lockfile.write_all(state.serialize().as_bytes())?;
        lockfile.commit()?;

        info!(kind = state.kind.as_str(), incoming = %state.incoming, conflicts = state.conflicts.len(), "merge state recorded");
        Ok(())
    }

    pub fn clear_merge_state(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(self.merge_state_path()) {
            Ok(()) => {
                info!("merge state cleared");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("unable to remove merge state"),
        }
    }

    /// Refuse to start another history-changing operation mid-merge
    pub fn ensure_no_pending_merge(&self) -> anyhow::Result<()> {
        match self.merge_state()? {
            Some(state) => Err(RepositoryError::MergeInProgress(state.kind.as_str().to_string()).into()),
            None => Ok(()),
        }
    }

    fn stash_path(&self) -> PathBuf {
        self.control_path().join(STASH_FILE)
    }

    /// Stash commits, newest first
    pub fn stash_stack(&self) -> anyhow::Result<Vec<ObjectId>> {
        let content = match std::fs::read_to_string(self.stash_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).context("unable to read stash stack"),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| ObjectId::try_parse(line.trim().to_string()))
            .collect()
    }

    pub fn write_stash_stack(&self, stack: &[ObjectId]) -> anyhow::Result<()> {
        let content = stack
            .iter()
            .map(|oid| format!("{oid}\n"))
            .collect::<String>();

        let mut lockfile = Lockfile::acquire(&self.stash_path())?;
        lockfile.write_all(content.as_bytes())?;
        lockfile.commit()
    }
}
