//! Per-path three-way classification
//!
//! Works on flattened trees (`path -> entry`) and never touches the disk, so the
//! outcome of a merge can be inspected before anything is materialized.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::blob::is_binary;
use crate::errors::RepositoryError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub type FlatTree = BTreeMap<PathBuf, DatabaseEntry>;

pub const OURS_MARKER: &str = "<<<<<<< ours";
pub const SEPARATOR_MARKER: &str = "=======";
pub const THEIRS_MARKER: &str = ">>>>>>> theirs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides changed the content differently
    Content,
    /// Both sides added the path with different content
    AddAdd,
    /// We deleted what they modified
    DeleteModify,
    /// We modified what they deleted
    ModifyDelete,
}

impl ConflictKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ConflictKind::Content => "content",
            ConflictKind::AddAdd => "add/add",
            ConflictKind::DeleteModify => "delete/modify",
            ConflictKind::ModifyDelete => "modify/delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResolution {
    Clean(DatabaseEntry),
    Deleted,
    Conflict {
        base: Option<DatabaseEntry>,
        ours: Option<DatabaseEntry>,
        theirs: Option<DatabaseEntry>,
        kind: ConflictKind,
    },
}

impl PathResolution {
    pub fn is_conflict(&self) -> bool {
        matches!(self, PathResolution::Conflict { .. })
    }
}

/// Classification of every path present in any of the three trees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResolution {
    paths: BTreeMap<PathBuf, PathResolution>,
}

impl MergeResolution {
    pub fn resolve(base: &FlatTree, ours: &FlatTree, theirs: &FlatTree) -> anyhow::Result<Self> {
        let all_paths = base
            .keys()
            .chain(ours.keys())
            .chain(theirs.keys())
            .collect::<BTreeSet<_>>();

        let paths = all_paths
            .into_iter()
            .map(|path| {
                let resolution = resolve_path(base.get(path), ours.get(path), theirs.get(path));
                (path.clone(), resolution)
            })
            .collect::<BTreeMap<_, _>>();

        let resolution = MergeResolution { paths };
        resolution.check_file_directory_collisions()?;

        Ok(resolution)
    }

    /// A file on one side where the other side needs a directory cannot be
    /// represented in the index, so the merge is refused up front
    fn check_file_directory_collisions(&self) -> anyhow::Result<()> {
        let kept = self
            .paths
            .iter()
            .filter(|(_, resolution)| !matches!(resolution, PathResolution::Deleted))
            .map(|(path, _)| path.as_path())
            .collect::<BTreeSet<_>>();

        for path in &kept {
            let collision = path
                .ancestors()
                .skip(1)
                .filter(|ancestor| !ancestor.as_os_str().is_empty())
                .find(|ancestor| kept.contains(ancestor));

            if let Some(file) = collision {
                return Err(RepositoryError::validation(format!(
                    "merge would need both a file and a directory at '{}' (see '{}')",
                    file.display(),
                    path.display()
                )));
            }
        }

        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&PathResolution> {
        self.paths.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &PathResolution)> {
        self.paths.iter()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = (&PathBuf, &PathResolution)> {
        self.paths
            .iter()
            .filter(|(_, resolution)| resolution.is_conflict())
    }

    pub fn conflicted_paths(&self) -> Vec<PathBuf> {
        self.conflicts().map(|(path, _)| path.clone()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts().next().is_none()
    }

    /// Tree to stage: clean results, with our version kept for conflicted paths
    pub fn merged_tree(&self) -> FlatTree {
        self.paths
            .iter()
            .filter_map(|(path, resolution)| match resolution {
                PathResolution::Clean(entry) => Some((path.clone(), entry.clone())),
                PathResolution::Conflict { ours: Some(ours), .. } => {
                    Some((path.clone(), ours.clone()))
                }
                PathResolution::Conflict { ours: None, .. } | PathResolution::Deleted => None,
            })
            .collect()
    }
}

fn resolve_path(
    base: Option<&DatabaseEntry>,
    ours: Option<&DatabaseEntry>,
    theirs: Option<&DatabaseEntry>,
) -> PathResolution {
    if ours == theirs {
        return match ours {
            Some(entry) => PathResolution::Clean(entry.clone()),
            None => PathResolution::Deleted,
        };
    }
    if ours == base {
        return match theirs {
            Some(entry) => PathResolution::Clean(entry.clone()),
            None => PathResolution::Deleted,
        };
    }
    if theirs == base {
        return match ours {
            Some(entry) => PathResolution::Clean(entry.clone()),
            None => PathResolution::Deleted,
        };
    }

    let kind = match (base, ours, theirs) {
        (None, _, _) => ConflictKind::AddAdd,
        (Some(_), None, Some(_)) => ConflictKind::DeleteModify,
        (Some(_), Some(_), None) => ConflictKind::ModifyDelete,
        _ => ConflictKind::Content,
    };

    PathResolution::Conflict {
        base: base.cloned(),
        ours: ours.cloned(),
        theirs: theirs.cloned(),
        kind,
    }
}

/// Working tree content for a conflicted path
///
/// Text sides are wrapped in markers; a missing side renders as empty. Binary
/// content is never interleaved with markers: our side is kept as-is, or theirs
/// when we have none.
pub fn render_conflict(ours: Option<&[u8]>, theirs: Option<&[u8]>) -> Vec<u8> {
    let binary = ours.is_some_and(is_binary) || theirs.is_some_and(is_binary);
    if binary {
        return ours.or(theirs).unwrap_or_default().to_vec();
    }

    let mut rendered = Vec::new();
    rendered.extend_from_slice(OURS_MARKER.as_bytes());
    rendered.push(b'\n');
    push_side(&mut rendered, ours.unwrap_or_default());
    rendered.extend_from_slice(SEPARATOR_MARKER.as_bytes());
    rendered.push(b'\n');
    push_side(&mut rendered, theirs.unwrap_or_default());
    rendered.extend_from_slice(THEIRS_MARKER.as_bytes());
    rendered.push(b'\n');

    rendered
}

fn push_side(rendered: &mut Vec<u8>, content: &[u8]) {
    rendered.extend_from_slice(content);
    if !content.is_empty() && !content.ends_with(b"\n") {
        rendered.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn entry(content: &str) -> DatabaseEntry {
        DatabaseEntry::new(
            ObjectId::digest(content.as_bytes()),
            EntryMode::File(FileMode::Regular),
        )
    }

    fn tree(files: &[(&str, &str)]) -> FlatTree {
        files
            .iter()
            .map(|(path, content)| (PathBuf::from(path), entry(content)))
            .collect()
    }

    fn one_path(base: Option<&str>, ours: Option<&str>, theirs: Option<&str>) -> PathResolution {
        resolve_path(
            base.map(entry).as_ref(),
            ours.map(entry).as_ref(),
            theirs.map(entry).as_ref(),
        )
    }

    #[rstest]
    #[case(Some("1"), Some("1"), Some("1"), PathResolution::Clean(entry("1")))]
    #[case(Some("1"), Some("2"), Some("1"), PathResolution::Clean(entry("2")))]
    #[case(Some("1"), Some("1"), Some("3"), PathResolution::Clean(entry("3")))]
    #[case(Some("1"), Some("2"), Some("2"), PathResolution::Clean(entry("2")))]
    #[case(Some("1"), None, None, PathResolution::Deleted)]
    #[case(Some("1"), None, Some("1"), PathResolution::Deleted)]
    #[case(Some("1"), Some("1"), None, PathResolution::Deleted)]
    #[case(None, None, Some("new"), PathResolution::Clean(entry("new")))]
    #[case(None, Some("same"), Some("same"), PathResolution::Clean(entry("same")))]
    fn clean_cases(
        #[case] base: Option<&str>,
        #[case] ours: Option<&str>,
        #[case] theirs: Option<&str>,
        #[case] expected: PathResolution,
    ) {
        assert_eq!(one_path(base, ours, theirs), expected);
    }

    #[rstest]
    #[case(Some("1"), Some("2"), Some("3"), ConflictKind::Content)]
    #[case(Some("1"), None, Some("3"), ConflictKind::DeleteModify)]
    #[case(Some("1"), Some("2"), None, ConflictKind::ModifyDelete)]
    #[case(None, Some("2"), Some("3"), ConflictKind::AddAdd)]
    fn conflicting_cases(
        #[case] base: Option<&str>,
        #[case] ours: Option<&str>,
        #[case] theirs: Option<&str>,
        #[case] expected: ConflictKind,
    ) {
        let PathResolution::Conflict { kind, .. } = one_path(base, ours, theirs) else {
            panic!("expected a conflict");
        };

        assert_eq!(kind, expected);
    }

    #[test]
    fn merged_tree_keeps_ours_for_conflicts() {
        let base = tree(&[("a.txt", "1"), ("b.txt", "b"), ("gone.txt", "x")]);
        let ours = tree(&[("a.txt", "2"), ("b.txt", "b"), ("gone.txt", "x")]);
        let theirs = tree(&[("a.txt", "3"), ("b.txt", "b2"), ("new.txt", "n")]);

        let resolution = MergeResolution::resolve(&base, &ours, &theirs).unwrap();

        assert!(!resolution.is_clean());
        assert_eq!(resolution.conflicted_paths(), vec![PathBuf::from("a.txt")]);
        assert_eq!(
            resolution.merged_tree(),
            tree(&[("a.txt", "2"), ("b.txt", "b2"), ("new.txt", "n")])
        );
    }

    #[test]
    fn file_against_directory_is_refused() {
        let base = tree(&[]);
        let ours = tree(&[("a", "file")]);
        let theirs = tree(&[("a/b.txt", "nested")]);

        let err = MergeResolution::resolve(&base, &ours, &theirs).unwrap_err();

        assert!(matches!(
            RepositoryError::classify(&err),
            Some(RepositoryError::Validation(_))
        ));
    }

    #[test]
    fn text_conflict_is_wrapped_in_markers() {
        let rendered = render_conflict(Some(b"2"), Some(b"3\n"));

        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            "<<<<<<< ours\n2\n=======\n3\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn deleted_side_renders_empty() {
        let rendered = render_conflict(None, Some(b"kept\n"));

        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            "<<<<<<< ours\n=======\nkept\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn binary_conflict_keeps_our_bytes() {
        assert_eq!(render_conflict(Some(b"\0ours"), Some(b"theirs")), b"\0ours".to_vec());
        assert_eq!(render_conflict(None, Some(b"\0theirs")), b"\0theirs".to_vec());
    }
}
