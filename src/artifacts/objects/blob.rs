//! Blob object
//!
//! Blobs store the raw bytes of one file version, without name or permissions
//! (those live in the tree entry that references the blob).
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

/// Number of leading bytes inspected by the binary heuristic
const BINARY_PROBE_SIZE: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    content: Bytes,
}

impl Blob {
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }

    /// A blob is considered binary when a NUL byte shows up near its start
    pub fn is_binary(&self) -> bool {
        is_binary(&self.content)
    }
}

pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_PROBE_SIZE).any(|&byte| byte == 0)
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(self.content.clone())
    }
}

impl Unpackable for Blob {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        // the header has already been read
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        Ok(Self::new(Bytes::from(content)))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.content).to_string()
    }
}
