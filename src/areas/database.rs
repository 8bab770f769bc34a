//! Loose object database
//!
//! Every object lives in its own zlib-compressed file under
//! `objects/<2 hex>/<38 hex>`. Writes land in a `tmp-obj-*` file in the fan-out
//! directory first and are renamed into place, so a reader never observes a
//! partially written object under its final name.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable, frame};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::errors::RepositoryError;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

const TEMP_OBJECT_PREFIX: &str = "tmp-obj-";

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
    commit_cache: RefCell<HashMap<ObjectId, SlimCommit>>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database {
            path,
            commit_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn tree_diff(
        &self,
        old_oid: Option<&ObjectId>,
        new_oid: Option<&ObjectId>,
    ) -> anyhow::Result<TreeDiff<'_>> {
        let mut tree_diff = TreeDiff::new(self);
        tree_diff.compare_oids(old_oid, new_oid, Path::new(""))?;
        Ok(tree_diff)
    }

    /// Store raw content of the given kind, returning its id
    ///
    /// Storing content that is already present is a no-op returning the same id.
    pub fn put(&self, object_type: ObjectType, content: &[u8]) -> anyhow::Result<ObjectId> {
        let framed = frame(object_type, content)?;
        let object_id = ObjectId::digest(&framed);
        let object_path = self.path.join(object_id.to_path());

        if !object_path.exists() {
            let object_dir = object_path
                .parent()
                .with_context(|| format!("invalid object path {}", object_path.display()))?;
            std::fs::create_dir_all(object_dir).with_context(|| {
                format!("unable to create object directory {}", object_dir.display())
            })?;

            self.write_object(&object_path, framed)?;
            tracing::debug!(oid = %object_id, kind = %object_type, size = content.len(), "stored object");
        }

        Ok(object_id)
    }

    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        self.put(object.object_type(), &object.serialize()?)
    }

    /// Fetch an object's kind and content, without its header
    pub fn get(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectType, Bytes)> {
        let framed = self.load(object_id)?;
        let mut reader = Cursor::new(framed.clone());
        let object_type = ObjectType::parse_object_header(object_id, &mut reader, framed.len())?;
        let header_len = reader.position() as usize;

        Ok((object_type, framed.slice(header_len..)))
    }

    pub fn exists(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    pub fn delete(&self, object_id: &ObjectId) -> anyhow::Result<()> {
        let object_path = self.path.join(object_id.to_path());
        std::fs::remove_file(&object_path)
            .with_context(|| format!("unable to delete object {}", object_path.display()))?;
        self.commit_cache.borrow_mut().remove(object_id);

        Ok(())
    }

    /// Decompressed, digest-checked framed bytes of an object
    pub fn load(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        let object_path = self.path.join(object_id.to_path());
        let compressed = match std::fs::read(&object_path) {
            Ok(compressed) => compressed,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::not_found(format!("object {object_id}")));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("unable to read object {}", object_path.display()));
            }
        };

        let framed = Self::decompress(&compressed).map_err(|err| {
            tracing::error!(oid = %object_id, error = %err, "undecodable object");
            anyhow::Error::from(RepositoryError::CorruptObject {
                oid: object_id.clone(),
                actual: "undecodable content".to_string(),
            })
        })?;

        let actual = ObjectId::digest(&framed);
        if &actual != object_id {
            tracing::error!(oid = %object_id, actual = %actual, "object digest mismatch");
            return Err(RepositoryError::CorruptObject {
                oid: object_id.clone(),
                actual: actual.to_string(),
            }
            .into());
        }

        Ok(framed)
    }

    pub fn object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        Ok(self.get(object_id)?.0)
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, content) = self.get(object_id)?;
        ObjectBox::parse(object_type, Cursor::new(content))
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Blob> {
        let content = self.content_of_kind(object_id, ObjectType::Blob)?;
        Blob::deserialize(Cursor::new(content))
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Tree> {
        let content = self.content_of_kind(object_id, ObjectType::Tree)?;
        Tree::deserialize(Cursor::new(content))
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Commit> {
        let content = self.content_of_kind(object_id, ObjectType::Commit)?;
        Commit::deserialize(Cursor::new(content))
    }

    pub fn parse_object_as_tag(&self, object_id: &ObjectId) -> anyhow::Result<Tag> {
        let content = self.content_of_kind(object_id, ObjectType::Tag)?;
        Tag::deserialize(Cursor::new(content))
    }

    fn content_of_kind(&self, object_id: &ObjectId, expected: ObjectType) -> anyhow::Result<Bytes> {
        let (object_type, content) = self.get(object_id)?;
        if object_type != expected {
            return Err(RepositoryError::validation(format!(
                "object {object_id} is a {object_type}, not a {expected}"
            )));
        }

        Ok(content)
    }

    /// Follow annotated tags until reaching a non-tag object
    pub fn peel(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let mut current = object_id.clone();

        while self.object_type(&current)? == ObjectType::Tag {
            current = self.parse_object_as_tag(&current)?.target().clone();
        }

        Ok(current)
    }

    /// Peel `object_id` to a commit, failing for trees and blobs
    pub fn peel_to_commit(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let peeled = self.peel(object_id)?;

        match self.object_type(&peeled)? {
            ObjectType::Commit => Ok(peeled),
            other => Err(RepositoryError::validation(format!(
                "{object_id} names a {other}, not a commit"
            ))),
        }
    }

    /// Root tree of the commit (or tag of a commit) `object_id`
    pub fn commit_tree_oid(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let commit_oid = self.peel_to_commit(object_id)?;
        Ok(self.parse_object_as_commit(&commit_oid)?.tree_oid().clone())
    }

    /// Every blob below a tree, keyed by its full path
    pub fn flatten_tree(
        &self,
        tree_oid: &ObjectId,
    ) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let mut flattened = BTreeMap::new();
        self.flatten_tree_into(tree_oid, Path::new(""), &mut flattened)?;

        Ok(flattened)
    }

    fn flatten_tree_into(
        &self,
        tree_oid: &ObjectId,
        prefix: &Path,
        flattened: &mut BTreeMap<PathBuf, DatabaseEntry>,
    ) -> anyhow::Result<()> {
        for (name, entry) in self.parse_object_as_tree(tree_oid)?.into_entries() {
            let path = prefix.join(name);

            if entry.is_tree() {
                self.flatten_tree_into(&entry.oid, &path, flattened)?;
            } else {
                flattened.insert(path, entry);
            }
        }

        Ok(())
    }

    /// Flattened tree of a commit, or nothing for an unborn branch
    pub fn commit_tree_map(
        &self,
        commit_oid: Option<&ObjectId>,
    ) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        match commit_oid {
            Some(commit_oid) => self.flatten_tree(&self.commit_tree_oid(commit_oid)?),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Parents and timestamp of a commit, memoized for graph walks
    pub fn load_slim_commit(&self, object_id: &ObjectId) -> anyhow::Result<SlimCommit> {
        if let Some(slim) = self.commit_cache.borrow().get(object_id) {
            return Ok(slim.clone());
        }

        let slim = self.parse_object_as_commit(object_id)?.to_slim(object_id.clone());
        self.commit_cache
            .borrow_mut()
            .insert(object_id.clone(), slim.clone());

        Ok(slim)
    }

    /// Every object id currently stored, in id order
    pub fn list_object_ids(&self) -> anyhow::Result<Vec<ObjectId>> {
        let mut object_ids = Vec::new();

        for (dir_name, dir_path) in self.fan_out_dirs()? {
            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let file_name = file_name.to_string_lossy();
                if file_name.starts_with(TEMP_OBJECT_PREFIX) {
                    continue;
                }
                if let Ok(oid) = ObjectId::try_parse(format!("{dir_name}{file_name}")) {
                    object_ids.push(oid);
                }
            }
        }
        object_ids.sort();

        Ok(object_ids)
    }

    /// Leftover temporary files from interrupted writes
    pub fn temp_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut temp_files = Vec::new();

        for (_, dir_path) in self.fan_out_dirs()? {
            for entry in std::fs::read_dir(&dir_path)? {
                let entry = entry?;
                if entry.file_name().to_string_lossy().starts_with(TEMP_OBJECT_PREFIX) {
                    temp_files.push(entry.path());
                }
            }
        }

        Ok(temp_files)
    }

    /// Remove fan-out directories left empty, returning how many went away
    pub fn prune_empty_dirs(&self) -> anyhow::Result<usize> {
        let mut pruned = 0;

        for (_, dir_path) in self.fan_out_dirs()? {
            if std::fs::read_dir(&dir_path)?.next().is_none() {
                std::fs::remove_dir(&dir_path)?;
                pruned += 1;
            }
        }

        Ok(pruned)
    }

    fn fan_out_dirs(&self) -> anyhow::Result<Vec<(String, PathBuf)>> {
        if !self.path.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir()
                && name.len() == 2
                && name.chars().all(|c| c.is_ascii_hexdigit())
            {
                dirs.push((name, entry.path()));
            }
        }

        Ok(dirs)
    }

    /// Find all objects whose id starts with the given prefix
    ///
    /// Only the matching fan-out directory is scanned when the prefix has at least
    /// two characters. More than one match means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < 2 {
            return Ok(self
                .list_object_ids()?
                .into_iter()
                .filter(|oid| oid.as_ref().starts_with(&prefix))
                .collect());
        }

        let (dir_name, file_prefix) = prefix.split_at(2);
        let dir_path = self.path.join(dir_name);
        let mut matches = Vec::new();

        if dir_path.is_dir() {
            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let file_name = file_name.to_string_lossy();

                if file_name.starts_with(file_prefix) {
                    if let Ok(oid) = ObjectId::try_parse(format!("{dir_name}{file_name}")) {
                        matches.push(oid);
                    }
                }
            }
        }
        matches.sort();

        Ok(matches)
    }

    fn write_object(&self, object_path: &Path, framed: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .with_context(|| format!("invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let compressed = Self::compress(&framed)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .with_context(|| {
                format!("unable to open object file {}", temp_object_path.display())
            })?;
        file.write_all(&compressed).with_context(|| {
            format!("unable to write object file {}", temp_object_path.display())
        })?;
        file.sync_all()?;

        std::fs::rename(&temp_object_path, object_path).with_context(|| {
            format!("unable to rename object file to {}", object_path.display())
        })?;

        Ok(())
    }

    fn compress(data: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .context("unable to compress object content")?;

        encoder
            .finish()
            .context("unable to finish compressing object content")
    }

    fn decompress(data: &[u8]) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .context("unable to decompress object content")?;

        Ok(decompressed.into())
    }

    fn generate_temp_name() -> String {
        format!("{TEMP_OBJECT_PREFIX}{}", rand::random::<u32>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn objects_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn database(dir: &TempDir) -> Database {
        Database::new(dir.path().join("objects").into_boxed_path())
    }

    #[rstest]
    fn put_is_idempotent(objects_dir: TempDir) {
        let database = database(&objects_dir);

        let first = database.put(ObjectType::Blob, b"same content").unwrap();
        let second = database.put(ObjectType::Blob, b"same content").unwrap();

        assert_eq!(first, second);
        assert_eq!(database.list_object_ids().unwrap(), vec![first.clone()]);
        assert_eq!(
            database.get(&first).unwrap(),
            (ObjectType::Blob, Bytes::from_static(b"same content"))
        );
    }

    #[rstest]
    fn missing_object_is_not_found(objects_dir: TempDir) {
        let database = database(&objects_dir);
        let oid = ObjectId::digest(b"never stored");

        let err = database.get(&oid).unwrap_err();
        assert!(matches!(
            RepositoryError::classify(&err),
            Some(RepositoryError::NotFound(_))
        ));
        assert!(!database.exists(&oid));
    }

    #[rstest]
    fn tampered_object_is_corrupt(objects_dir: TempDir) {
        let database = database(&objects_dir);
        let oid = database.put(ObjectType::Blob, b"original").unwrap();
        let forged = database.put(ObjectType::Blob, b"forged").unwrap();

        // swap the stored bytes of one object for another
        let object_path = database.objects_path().join(oid.to_path());
        std::fs::remove_file(&object_path).unwrap();
        std::fs::copy(database.objects_path().join(forged.to_path()), &object_path).unwrap();

        let err = database.get(&oid).unwrap_err();
        let classified = RepositoryError::classify(&err).unwrap();
        assert!(classified.is_fatal());
    }

    #[rstest]
    fn delete_removes_object_and_prune_clears_dir(objects_dir: TempDir) {
        let database = database(&objects_dir);
        let oid = database.put(ObjectType::Blob, b"short lived").unwrap();

        database.delete(&oid).unwrap();

        assert!(!database.exists(&oid));
        assert_eq!(database.prune_empty_dirs().unwrap(), 1);
    }

    #[rstest]
    fn prefix_lookup_finds_unique_object(objects_dir: TempDir) {
        let database = database(&objects_dir);
        let oid = database.put(ObjectType::Blob, b"lookup").unwrap();

        let matches = database.find_objects_by_prefix(&oid.as_ref()[..6]).unwrap();
        assert_eq!(matches, vec![oid]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn stored_content_reads_back_unchanged(content in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let dir = TempDir::new().unwrap();
            let database = database(&dir);

            let oid = database.put(ObjectType::Blob, &content).unwrap();
            let again = database.put(ObjectType::Blob, &content).unwrap();

            prop_assert_eq!(&oid, &again);
            prop_assert_eq!(database.get(&oid).unwrap().1.to_vec(), content);
        }
    }
}
