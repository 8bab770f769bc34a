use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use anyhow::{Context, bail};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{BufRead, Write};

/// Opening 12 bytes of the index; only the entry count varies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexHeader {
    pub entries_count: u32,
}

impl IndexHeader {
    pub fn for_entries(entries_count: usize) -> anyhow::Result<Self> {
        let entries_count =
            u32::try_from(entries_count).context("too many entries for one index file")?;

        Ok(IndexHeader { entries_count })
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(SIGNATURE.as_bytes())?;
        bytes.write_u32::<NetworkEndian>(VERSION)?;
        bytes.write_u32::<NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for IndexHeader {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut signature = [0u8; 4];
        reader
            .read_exact(&mut signature)
            .context("truncated index header")?;
        if signature.as_slice() != SIGNATURE.as_bytes() {
            bail!("invalid index file signature");
        }

        let version = reader
            .read_u32::<NetworkEndian>()
            .context("truncated index header")?;
        if version != VERSION {
            bail!("unsupported index file version: {version}");
        }

        let entries_count = reader
            .read_u32::<NetworkEndian>()
            .context("truncated index header")?;

        Ok(IndexHeader { entries_count })
    }
}
