use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    /// Consume the `<type> <size>\0` header, checking the declared size against the
    /// number of bytes that follow it.
    pub fn parse_object_header(
        object_id: &ObjectId,
        data_reader: &mut impl BufRead,
        total_len: usize,
    ) -> anyhow::Result<ObjectType> {
        let mut object_type = Vec::new();
        data_reader.read_until(b' ', &mut object_type)?;

        let object_type = String::from_utf8(object_type)?;
        let object_type = object_type.trim();

        let mut size = Vec::new();
        data_reader.read_until(b'\0', &mut size)?;
        let header_len = object_type.len() + 1 + size.len();
        if size.pop() != Some(b'\0') {
            return Err(Self::corrupt(object_id, "truncated header"));
        }

        let size = std::str::from_utf8(&size)?
            .parse::<usize>()
            .map_err(|_| Self::corrupt(object_id, "malformed size"))?;
        if header_len + size != total_len {
            return Err(Self::corrupt(object_id, "size mismatch"));
        }

        ObjectType::try_from(object_type)
    }

    fn corrupt(object_id: &ObjectId, reason: &str) -> anyhow::Error {
        RepositoryError::CorruptObject {
            oid: object_id.clone(),
            actual: reason.to_string(),
        }
        .into()
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(anyhow::anyhow!("Invalid object type {value}")),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
