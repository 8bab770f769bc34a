use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use derive_new::new;
use std::path::Path;

/// Compares the three areas pairwise: working tree against index, index against HEAD
#[derive(new)]
pub struct Inspector<'r> {
    repository: &'r Repository,
}

impl<'r> Inspector<'r> {
    /// Whether `path` is, or contains, a file the index does not know about
    pub fn is_trackable(&self, path: &Path, index: &Index) -> anyhow::Result<bool> {
        let workspace = self.repository.workspace();
        let Ok(stat) = workspace.stat_file(path) else {
            return Ok(false);
        };

        if !stat.mode.is_tree() {
            return Ok(!index.is_directly_tracked(path));
        }

        for child in workspace.list_dir(Some(path))? {
            if self.is_trackable(&child, index)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn is_content_changed(&self, index_entry: &IndexEntry) -> anyhow::Result<bool> {
        let blob = self.repository.workspace().parse_blob(&index_entry.name)?;

        Ok(blob.object_id()? != index_entry.oid)
    }

    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> anyhow::Result<WorkspaceChangeType> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChangeType::Untracked),
            (Some(_), None) => Ok(WorkspaceChangeType::Deleted),
            (Some(_), Some(stat)) if stat.mode.is_tree() => Ok(WorkspaceChangeType::Deleted),
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChangeType::Modified)
            }
            (Some(entry), Some(stat)) if entry.times_match(stat) => Ok(WorkspaceChangeType::None),
            (Some(entry), Some(_)) if self.is_content_changed(entry)? => {
                Ok(WorkspaceChangeType::Modified)
            }
            _ => Ok(WorkspaceChangeType::None),
        }
    }

    pub fn check_index_against_head_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        head_entry: Option<&DatabaseEntry>,
    ) -> IndexChangeType {
        match (index_entry, head_entry) {
            (Some(index_entry), Some(head_entry))
                if head_entry.mode != index_entry.metadata.mode
                    || head_entry.oid != index_entry.oid =>
            {
                IndexChangeType::Modified
            }
            (Some(_), None) => IndexChangeType::Added,
            (None, Some(_)) => IndexChangeType::Deleted,
            _ => IndexChangeType::None,
        }
    }
}
