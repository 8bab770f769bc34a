//! Pending merge or cherry-pick, persisted between the conflicted operation and
//! the commit that concludes it
//!
//! ```text
//! merge 3b18e512dba79e4c8300dd08aeb37f8e728b8dad
//! message Merge branch 'feature'
//! conflict src/lib.rs
//! ```

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Merge,
    CherryPick,
}

impl PendingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingKind::Merge => "merge",
            PendingKind::CherryPick => "cherry-pick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeState {
    pub kind: PendingKind,
    pub incoming: ObjectId,
    pub message: String,
    pub conflicts: Vec<PathBuf>,
}

impl MergeState {
    pub fn serialize(&self) -> String {
        let mut content = format!("{} {}\n", self.kind.as_str(), self.incoming);
        content.push_str(&format!("message {}\n", escape(&self.message)));
        for path in &self.conflicts {
            content.push_str(&format!("conflict {}\n", path.display()));
        }

        content
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let malformed = |line: &str| RepositoryError::validation(format!("malformed merge state line '{line}'"));
        let mut lines = content.lines();

        let header = lines.next().ok_or_else(|| malformed(""))?;
        let (kind, incoming) = header.split_once(' ').ok_or_else(|| malformed(header))?;
        let kind = match kind {
            "merge" => PendingKind::Merge,
            "cherry-pick" => PendingKind::CherryPick,
            _ => return Err(malformed(header)),
        };

        let mut state = MergeState {
            kind,
            incoming: ObjectId::try_parse(incoming.to_string())?,
            message: String::new(),
            conflicts: Vec::new(),
        };

        for line in lines {
            match line.split_once(' ') {
                Some(("message", message)) => state.message = unescape(message),
                Some(("conflict", path)) => state.conflicts.push(PathBuf::from(path)),
                _ => return Err(malformed(line)),
            }
        }

        Ok(state)
    }

    /// Parents of the commit concluding this operation, after HEAD
    pub fn extra_parents(&self) -> Vec<ObjectId> {
        match self.kind {
            PendingKind::Merge => vec![self.incoming.clone()],
            PendingKind::CherryPick => Vec::new(),
        }
    }
}

fn escape(message: &str) -> String {
    message.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(message: &str) -> String {
    let mut unescaped = String::with_capacity(message.len());
    let mut chars = message.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }

    unescaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn multi_line_message_survives_a_reload() {
        let state = MergeState {
            kind: PendingKind::CherryPick,
            incoming: ObjectId::digest(b"picked"),
            message: "subject\n\nbody with a \\ backslash".to_string(),
            conflicts: vec![PathBuf::from("a.txt"), PathBuf::from("dir/b c.txt")],
        };

        let serialized = state.serialize();
        assert_eq!(serialized.lines().count(), 4);
        assert_eq!(MergeState::parse(&serialized).unwrap(), state);
        assert!(state.extra_parents().is_empty());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let content = format!("rebase {}\n", ObjectId::digest(b"x"));

        assert!(MergeState::parse(&content).is_err());
    }
}
