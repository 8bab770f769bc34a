use crate::areas::database::Database;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::hunk::{ContentDiff, diff_content};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use std::path::{Path, PathBuf};

const NULL_OID_RAW: &str = "0000000000000000000000000000000000000000";
const NULL_PATH: &str = "/dev/null";

/// One side of a file diff: its content, id and mode, or nothing at all
#[derive(Debug, Clone)]
pub struct DiffTarget {
    pub(crate) file: PathBuf,
    pub(crate) oid: ObjectId,
    pub(crate) mode: Option<EntryMode>,
    pub(crate) data: Bytes,
}

impl DiffTarget {
    /// Side backed by a stored blob (a HEAD tree or index entry)
    pub fn from_entry(
        file: &Path,
        entry: &DatabaseEntry,
        database: &Database,
    ) -> anyhow::Result<Self> {
        let blob = database.parse_object_as_blob(&entry.oid)?;

        Ok(Self {
            file: file.to_path_buf(),
            oid: entry.oid.clone(),
            mode: Some(entry.mode),
            data: blob.into_content(),
        })
    }

    /// Side read straight from the working tree
    pub fn from_file(file: &Path, workspace: &Workspace) -> anyhow::Result<Self> {
        let blob = workspace.parse_blob(file)?;
        let oid = blob.object_id()?;
        let mode = workspace.stat_file(file)?.mode;

        Ok(Self {
            file: file.to_path_buf(),
            oid,
            mode: Some(mode),
            data: blob.into_content(),
        })
    }

    pub fn from_nothing(file: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            file: file.to_path_buf(),
            oid: ObjectId::try_parse(NULL_OID_RAW.to_string())?,
            mode: None,
            data: Bytes::new(),
        })
    }

    /// `a/<file>` or `b/<file>` for an existing side, `/dev/null` otherwise
    pub fn diff_path(&self, side: &str) -> PathBuf {
        if self.mode.is_some() {
            Path::new(side).join(&self.file)
        } else {
            PathBuf::from(NULL_PATH)
        }
    }

    pub fn pretty_mode(&self) -> &str {
        self.mode
            .as_ref()
            .map(EntryMode::as_str)
            .unwrap_or("100644")
    }

    pub fn content_diff(&self, other: &DiffTarget) -> ContentDiff {
        diff_content(&self.data, &other.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_side_renders_as_dev_null() {
        let target = DiffTarget::from_nothing(Path::new("a.txt")).unwrap();

        assert_eq!(target.diff_path("a"), PathBuf::from("/dev/null"));
        assert_eq!(target.pretty_mode(), "100644");
        assert_eq!(target.oid.to_short_oid(), "0000000");
    }
}
