use crate::errors::RepositoryError;

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
}

/// Mode recorded for a tree entry or an index entry
#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum EntryMode {
    File(FileMode),
    #[default]
    Directory,
}

impl EntryMode {
    pub fn as_str(&self) -> &str {
        match self {
            EntryMode::File(FileMode::Regular) => "100644",
            EntryMode::File(FileMode::Executable) => "100755",
            EntryMode::Directory => "40000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::File(FileMode::Regular) => 0o100644,
            EntryMode::File(FileMode::Executable) => 0o100755,
            EntryMode::Directory => 0o40000,
        }
    }

    pub fn from_octal_str(mode: &str) -> anyhow::Result<Self> {
        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| RepositoryError::validation(format!("invalid entry mode {mode}")))?;

        Self::try_from(mode)
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, EntryMode::File(FileMode::Executable))
    }
}

impl TryFrom<u32> for EntryMode {
    type Error = anyhow::Error;

    fn try_from(mode: u32) -> anyhow::Result<Self> {
        match mode {
            0o100644 => Ok(EntryMode::File(FileMode::Regular)),
            0o100755 => Ok(EntryMode::File(FileMode::Executable)),
            0o40000 => Ok(EntryMode::Directory),
            _ => Err(RepositoryError::validation(format!(
                "invalid entry mode {mode:o}"
            ))),
        }
    }
}

impl From<FileMode> for EntryMode {
    fn from(mode: FileMode) -> Self {
        EntryMode::File(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("100644", EntryMode::File(FileMode::Regular))]
    #[case("100755", EntryMode::File(FileMode::Executable))]
    #[case("40000", EntryMode::Directory)]
    fn octal_modes_round_trip(#[case] raw: &str, #[case] expected: EntryMode) {
        let mode = EntryMode::from_octal_str(raw).unwrap();
        pretty_assertions::assert_eq!(mode, expected);
        pretty_assertions::assert_eq!(mode.as_str(), raw);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(EntryMode::from_octal_str("120000").is_err());
        assert!(EntryMode::from_octal_str("garbage").is_err());
    }
}
