//! SHA-1 trailer of the index file
//!
//! Every byte read from or written to the index passes through a running
//! digest, and the last `CHECKSUM_SIZE` bytes of the file hold that digest.

use crate::artifacts::index::CHECKSUM_SIZE;
use anyhow::{Context, bail};
use bytes::Bytes;
use file_guard::FileGuard;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{Read, Write};
use std::ops::DerefMut;

/// A locked index file and the digest of everything passed through it so far
pub struct ChecksummedFile<'f> {
    file: FileGuard<&'f mut File>,
    digest: Sha1,
}

impl<'f> ChecksummedFile<'f> {
    pub fn new(file: FileGuard<&'f mut File>) -> Self {
        ChecksummedFile {
            file,
            digest: Sha1::new(),
        }
    }

    pub fn read_exact(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0; size];
        self.file
            .deref_mut()
            .read_exact(&mut buffer)
            .context("unexpected end of index file")?;
        self.digest.update(&buffer);

        Ok(Bytes::from(buffer))
    }

    pub fn write_all(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file
            .deref_mut()
            .write_all(data)
            .context("unable to write index")?;
        self.digest.update(data);

        Ok(())
    }

    /// Append the trailer and flush the file to disk
    pub fn finish(self) -> anyhow::Result<()> {
        let ChecksummedFile { mut file, digest } = self;
        let file = file.deref_mut();

        file.write_all(digest.finalize().as_slice())
            .context("unable to write index checksum")?;
        file.sync_all().context("unable to sync index")?;

        Ok(())
    }

    /// Check the trailer against the digest of everything read, and that nothing follows it
    pub fn verify(self) -> anyhow::Result<()> {
        let ChecksummedFile { mut file, digest } = self;
        let file = file.deref_mut();

        let mut stored = [0u8; CHECKSUM_SIZE];
        file.read_exact(&mut stored)
            .context("index file is missing its checksum")?;
        if digest.finalize().as_slice() != stored.as_slice() {
            bail!("index checksum mismatch, the index file is corrupt");
        }

        let mut trailing = [0u8; 1];
        if file.read(&mut trailing)? != 0 {
            bail!("unexpected data after the index checksum");
        }

        Ok(())
    }
}
