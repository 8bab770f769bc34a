//! Annotated tag object
//!
//! ## Format
//!
//! ```text
//! tag <size>\0
//! object <target-sha>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```
//!
//! Lightweight tags have no object at all: they are a ref under `refs/tags`
//! pointing straight at a commit.

use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    name: String,
    tagger: Author,
    message: String,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Author {
        &self.tagger
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn render(&self) -> String {
        format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.target,
            self.target_type,
            self.name,
            self.tagger.display(),
            self.message
        )
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(self.render()))
    }
}

impl Unpackable for Tag {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .context("invalid tag object: missing message separator")?;
        let mut lines = headers.lines();
        let mut field = |prefix: &str| {
            lines
                .next()
                .and_then(|line| line.strip_prefix(prefix))
                .map(str::to_string)
                .with_context(|| format!("invalid tag object: missing '{}' line", prefix.trim()))
        };

        let target = ObjectId::try_parse(field("object ")?)?;
        let target_type = ObjectType::try_from(field("type ")?.as_str())?;
        let name = field("tag ")?;
        let tagger = Author::try_from(field("tagger ")?.as_str())?;

        Ok(Tag::new(target, target_type, name, tagger, message.to_string()))
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        self.render()
    }
}
