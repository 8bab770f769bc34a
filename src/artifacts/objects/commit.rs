//! Commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer information
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//!
//! <commit message>
//! ```

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepositoryError;
use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use std::io::BufRead;

pub const AUTHOR_NAME_ENV: &str = "TWIG_AUTHOR_NAME";
pub const AUTHOR_EMAIL_ENV: &str = "TWIG_AUTHOR_EMAIL";
pub const AUTHOR_DATE_ENV: &str = "TWIG_AUTHOR_DATE";

const DEFAULT_AUTHOR_NAME: &str = "Twig User";
const DEFAULT_AUTHOR_EMAIL: &str = "user@twig.local";

/// Author, committer or tagger signature
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: DateTime<FixedOffset>,
}

impl Author {
    /// Create a new author with the current timestamp
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(name: String, email: String, timestamp: DateTime<FixedOffset>) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    /// "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// "Name <email> timestamp timezone", as stored in objects
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    /// Build a signature from the environment
    ///
    /// Reads TWIG_AUTHOR_NAME, TWIG_AUTHOR_EMAIL and TWIG_AUTHOR_DATE. Missing
    /// identity falls back to a fixed placeholder, a missing date means now.
    pub fn load_from_env() -> Self {
        let name = std::env::var(AUTHOR_NAME_ENV)
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string());
        let email = std::env::var(AUTHOR_EMAIL_ENV)
            .ok()
            .filter(|email| !email.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string());
        let timestamp = std::env::var(AUTHOR_DATE_ENV)
            .ok()
            .and_then(|date| parse_date(&date));

        match timestamp {
            Some(timestamp) => Author::new_with_timestamp(name, email, timestamp),
            None => Author::new(name, email),
        }
    }

    /// Replace name and email with an identity of the form "Name <email>"
    pub fn with_identity(self, identity: &str) -> anyhow::Result<Self> {
        let (name, email) = split_identity(identity)?;

        Ok(Author {
            name,
            email,
            timestamp: self.timestamp,
        })
    }

    /// Format timestamp like "Mon Jan 1 12:34:56 2024 +0000"
    pub fn readable_timestamp(&self) -> String {
        self.timestamp
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string()
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }
}

fn parse_date(date: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(date)
        .or_else(|_| DateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
}

fn split_identity(identity: &str) -> anyhow::Result<(String, String)> {
    let invalid = || RepositoryError::validation(format!("malformed identity '{identity}'"));

    let email_start = identity.find('<').ok_or_else(invalid)?;
    let email_end = identity.rfind('>').ok_or_else(invalid)?;
    if email_end < email_start {
        return Err(invalid());
    }

    let name = identity[..email_start].trim().to_string();
    let email = identity[email_start + 1..email_end].trim().to_string();
    if name.is_empty() || email.is_empty() {
        return Err(invalid());
    }

    Ok((name, email))
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // "name <email> timestamp timezone", split from the right
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            return Err(anyhow::anyhow!("invalid signature '{value}'"));
        }

        let timezone = parts[0];
        let timestamp = parts[1]
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("invalid timestamp in signature '{value}'"))?;
        let (name, email) = split_identity(parts[2])?;

        let offset = DateTime::parse_from_str(&format!("1970-01-01 00:00:00 {timezone}"), "%Y-%m-%d %H:%M:%S %z")
            .map_err(|_| anyhow::anyhow!("invalid timezone in signature '{value}'"))?
            .offset()
            .to_owned();
        let timestamp = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid timestamp in signature '{value}'"))?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp,
        })
    }
}

/// Slim representation of a commit
///
/// Holds only what graph walks need, so the database can cache it cheaply.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    pub timestamp: DateTime<FixedOffset>,
}

impl PartialOrd for SlimCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Newer commits order after older ones; ties fall back to the object id
impl Ord for SlimCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| other.oid.cmp(&self.oid))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Empty for a root commit, two or more for a merge commit
    parents: Vec<ObjectId>,
    tree_oid: ObjectId,
    author: Author,
    committer: Author,
    message: String,
}

impl Commit {
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Author,
        committer: Author,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            author,
            committer,
            message,
        }
    }

    /// First line of the commit message
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.committer.timestamp()
    }

    pub fn to_slim(&self, oid: ObjectId) -> SlimCommit {
        SlimCommit {
            oid,
            parents: self.parents.clone(),
            timestamp: self.timestamp(),
        }
    }

    fn header_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("tree {}", self.tree_oid)];
        for parent in &self.parents {
            lines.push(format!("parent {parent}"));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));

        lines
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let content = format!("{}\n\n{}", self.header_lines().join("\n"), self.message);

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .context("invalid commit object: missing message separator")?;
        let mut lines = headers.lines().peekable();

        let tree_oid = lines
            .next()
            .and_then(|line| line.strip_prefix("tree "))
            .context("invalid commit object: missing tree line")?;
        let tree_oid = ObjectId::try_parse(tree_oid.to_string())?;

        let mut parents = Vec::new();
        while let Some(parent) = lines.peek().and_then(|line| line.strip_prefix("parent ")) {
            parents.push(ObjectId::try_parse(parent.to_string())?);
            lines.next();
        }

        let author = lines
            .next()
            .and_then(|line| line.strip_prefix("author "))
            .context("invalid commit object: missing author line")?;
        let author = Author::try_from(author)?;

        let committer = lines
            .next()
            .and_then(|line| line.strip_prefix("committer "))
            .context("invalid commit object: missing committer line")?;
        let committer = Author::try_from(committer)?;

        Ok(Self::new(
            parents,
            tree_oid,
            author,
            committer,
            message.to_string(),
        ))
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        format!("{}\n\n{}", self.header_lines().join("\n"), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn signature() -> Author {
        Author::try_from("Ada Lovelace <ada@example.com> 1700000000 +0200").unwrap()
    }

    #[test]
    fn signature_keeps_timezone() {
        let author = signature();

        assert_eq!(author.display(), "Ada Lovelace <ada@example.com> 1700000000 +0200");
        assert_eq!(author.display_name(), "Ada Lovelace <ada@example.com>");
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![ObjectId::digest(b"one")])]
    #[case(vec![ObjectId::digest(b"one"), ObjectId::digest(b"two")])]
    fn commit_parses_back_identically(#[case] parents: Vec<ObjectId>) {
        let commit = Commit::new(
            parents,
            ObjectId::digest(b"tree"),
            signature(),
            signature(),
            "subject\n\nbody with\n\nblank lines\n".to_string(),
        );

        let parsed = Commit::deserialize(commit.serialize().unwrap().as_ref()).unwrap();
        assert_eq!(parsed, commit);
        assert_eq!(parsed.object_id().unwrap(), commit.object_id().unwrap());
    }

    #[rstest]
    #[case("Grace Hopper <grace@navy.mil>", true)]
    #[case("no email here", false)]
    #[case("<only@email>", false)]
    fn identity_override_is_validated(#[case] identity: &str, #[case] valid: bool) {
        assert_eq!(signature().with_identity(identity).is_ok(), valid);
    }

    #[test]
    fn slim_commits_order_by_time_then_id() {
        let older = SlimCommit {
            oid: ObjectId::digest(b"a"),
            parents: vec![],
            timestamp: signature().timestamp(),
        };
        let newer = SlimCommit {
            timestamp: signature().timestamp() + chrono::Duration::seconds(1),
            ..older.clone()
        };

        assert!(newer > older);
    }
}
