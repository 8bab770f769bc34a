//! Tree object
//!
//! Trees represent directory snapshots. They map entry names to blobs
//! (files) and to other trees (subdirectories), along with their modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! Entries are always serialized in name order, so two trees holding the same
//! entry set hash identically no matter how they were assembled.
//!
//! ## Tree Building
//!
//! A tree built from index entries keeps its freshly built subtrees around so
//! that [`Tree::traverse`] can hand them out children-first for storage. Trees
//! parsed from the database only carry their direct entries.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepositoryError;
use anyhow::{Context, anyhow};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Component;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, DatabaseEntry>,
    /// Subtrees built alongside this tree that still need storing
    subtrees: Vec<Tree>,
}

/// Intermediate directory node used while grouping index paths
#[derive(Default)]
struct PendingTree {
    files: BTreeMap<String, DatabaseEntry>,
    directories: BTreeMap<String, PendingTree>,
}

impl PendingTree {
    fn insert(&mut self, components: &[String], entry: DatabaseEntry) -> anyhow::Result<()> {
        match components {
            [] => Err(anyhow!("empty path in index")),
            [name] => {
                if self.directories.contains_key(name) {
                    return Err(file_directory_collision(name));
                }
                self.files.insert(name.clone(), entry);
                Ok(())
            }
            [dir, rest @ ..] => {
                if self.files.contains_key(dir) {
                    return Err(file_directory_collision(dir));
                }
                self.directories
                    .entry(dir.clone())
                    .or_default()
                    .insert(rest, entry)
            }
        }
    }

    fn seal(self) -> anyhow::Result<Tree> {
        let mut tree = Tree {
            entries: self.files,
            subtrees: Vec::new(),
        };

        for (name, pending) in self.directories {
            let subtree = pending.seal()?;
            tree.entries.insert(
                name,
                DatabaseEntry::new(subtree.object_id()?, EntryMode::Directory),
            );
            tree.subtrees.push(subtree);
        }

        Ok(tree)
    }
}

fn file_directory_collision(name: &str) -> anyhow::Error {
    RepositoryError::validation(format!("'{name}' is tracked both as a file and a directory"))
}

/// Entry names must be a single, non-empty path component
pub fn validate_entry_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(RepositoryError::validation(format!(
            "invalid tree entry name {name:?}"
        )));
    }

    Ok(())
}

impl Tree {
    /// The tree with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a tree hierarchy from stage-0 index entries
    ///
    /// Input order does not matter; entries end up keyed by name at every level.
    pub fn build<'e>(entries: impl IntoIterator<Item = &'e IndexEntry>) -> anyhow::Result<Self> {
        let mut root = PendingTree::default();

        for entry in entries {
            let components = entry
                .name
                .components()
                .map(|component| match component {
                    Component::Normal(name) => name
                        .to_str()
                        .map(str::to_string)
                        .ok_or_else(|| anyhow!("non UTF-8 path {}", entry.name.display())),
                    _ => Err(RepositoryError::validation(format!(
                        "path {} is not relative to the repository root",
                        entry.name.display()
                    ))),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            for name in &components {
                validate_entry_name(name)?;
            }
            root.insert(&components, entry.database_entry())?;
        }

        root.seal()
    }

    /// Visit every freshly built tree, children before parents
    pub fn traverse<F>(&self, func: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(&Tree) -> anyhow::Result<()>,
    {
        for subtree in &self.subtrees {
            subtree.traverse(func)?;
        }

        func(self)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.entries.into_iter()
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseEntry> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content = Vec::new();

        for (name, entry) in &self.entries {
            write!(content, "{:o} {}", entry.mode.as_u32(), name)?;
            content.push(0);
            entry.oid.write_h40_to(&mut content)?;
        }

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();

        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            if reader.read_until(b' ', &mut mode_bytes)? == 0 {
                break;
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(anyhow!("unexpected EOF in tree entry mode"));
            }
            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                return Err(anyhow!("unexpected EOF in tree entry name"));
            }
            let name = std::str::from_utf8(&name_bytes)?.to_owned();
            validate_entry_name(&name)?;

            let oid = ObjectId::read_h40_from(&mut reader)
                .context("unexpected EOF in tree entry object id")?;

            entries.insert(name, DatabaseEntry::new(oid, mode));
        }

        Ok(Tree {
            entries,
            subtrees: Vec::new(),
        })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let object_type = if entry.is_tree() {
                    ObjectType::Tree
                } else {
                    ObjectType::Blob
                };
                format!("{} {} {}\t{}", entry.mode.as_str(), object_type, entry.oid, name)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
