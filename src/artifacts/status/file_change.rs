use colored::{ColoredString, Colorize};

const LABEL_WIDTH: usize = 8;

/// How the working tree copy differs from the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WorkspaceChangeType {
    #[default]
    None,
    Untracked,
    Modified,
    Deleted,
}

impl WorkspaceChangeType {
    pub fn short_code(&self) -> &'static str {
        match self {
            WorkspaceChangeType::None => " ",
            WorkspaceChangeType::Untracked => "?",
            WorkspaceChangeType::Modified => "M",
            WorkspaceChangeType::Deleted => "D",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            WorkspaceChangeType::None | WorkspaceChangeType::Untracked => "",
            WorkspaceChangeType::Modified => "modified:   ",
            WorkspaceChangeType::Deleted => "deleted:    ",
        }
    }
}

/// How the index differs from the HEAD tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IndexChangeType {
    #[default]
    None,
    Added,
    Modified,
    Deleted,
}

impl IndexChangeType {
    pub fn short_code(&self) -> &'static str {
        match self {
            IndexChangeType::None => " ",
            IndexChangeType::Added => "A",
            IndexChangeType::Modified => "M",
            IndexChangeType::Deleted => "D",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            IndexChangeType::None => "",
            IndexChangeType::Added => "new file:   ",
            IndexChangeType::Modified => "modified:   ",
            IndexChangeType::Deleted => "deleted:    ",
        }
    }
}

/// One side of a change, rendered as a colored, indented label in long status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileChangeType {
    Workspace(WorkspaceChangeType),
    Index(IndexChangeType),
}

impl std::fmt::Display for FileChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label: ColoredString = match self {
            FileChangeType::Workspace(change) => change.label().red(),
            FileChangeType::Index(change) => change.label().green(),
        };
        write!(f, "{:>width$}{}", "", label, width = LABEL_WIDTH)
    }
}

/// Both sides of a tracked path's change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FileChange {
    pub(crate) workspace_change: WorkspaceChangeType,
    pub(crate) index_change: IndexChangeType,
}

impl std::fmt::Display for FileChange {
    /// Two-column code, index first: `M `, ` D`, `AM`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            self.index_change.short_code(),
            self.workspace_change.short_code()
        )
    }
}
