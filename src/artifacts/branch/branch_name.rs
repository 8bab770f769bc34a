use crate::artifacts::branch::{INVALID_BRANCH_NAME_REGEX, TAGS_PREFIX};
use crate::errors::RepositoryError;
use anyhow::Context;
use derive_new::new;

pub const HEADS_PREFIX: &str = "refs/heads/";
pub const HEAD_REF_NAME: &str = "HEAD";

/// Full ref path relative to the control directory, e.g. `refs/heads/master`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct SymRefName(String);

impl SymRefName {
    pub fn head() -> Self {
        Self(HEAD_REF_NAME.to_string())
    }

    pub fn branch(name: &BranchName) -> Self {
        Self(format!("{HEADS_PREFIX}{name}"))
    }

    pub fn tag(name: &BranchName) -> Self {
        Self(format!("{TAGS_PREFIX}{name}"))
    }

    pub fn is_head(&self) -> bool {
        self.0 == HEAD_REF_NAME
    }

    pub fn as_ref_path(&self) -> &str {
        &self.0
    }

    /// Name as shown to users: `master`, `tag: v1.0`, `HEAD`
    pub fn short_name(&self) -> String {
        if let Some(branch) = self.0.strip_prefix(HEADS_PREFIX) {
            branch.to_string()
        } else if let Some(tag) = self.0.strip_prefix(TAGS_PREFIX) {
            format!("tag: {tag}")
        } else {
            self.0.clone()
        }
    }
}

impl std::fmt::Display for SymRefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated short name of a branch or tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: String) -> anyhow::Result<Self> {
        if name.is_empty() {
            return Err(RepositoryError::validation("ref name cannot be empty"));
        }

        let re = regex::Regex::new(INVALID_BRANCH_NAME_REGEX)
            .with_context(|| format!("invalid ref name regex: {INVALID_BRANCH_NAME_REGEX}"))?;

        if re.is_match(&name) {
            Err(RepositoryError::validation(format!(
                "'{name}' is not a valid ref name"
            )))
        } else {
            Ok(Self(name))
        }
    }

    pub fn try_parse_sym_ref_name(sym_ref_name: &SymRefName) -> anyhow::Result<Self> {
        let name = sym_ref_name
            .as_ref_path()
            .strip_prefix(HEADS_PREFIX)
            .with_context(|| {
                format!("'{sym_ref_name}' does not name a branch under '{HEADS_PREFIX}'")
            })?;

        Self::try_parse(name.to_string())
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;

    proptest! {
        #[test]
        fn plain_and_hierarchical_names_are_valid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(BranchName::try_parse(prefix.clone()).is_ok());
            assert!(BranchName::try_parse(format!("{prefix}/{suffix}")).is_ok());
        }

        #[test]
        fn names_with_forbidden_sequences_are_rejected(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~ ]"
        ) {
            assert!(BranchName::try_parse(format!(".{suffix}")).is_err());
            assert!(BranchName::try_parse(format!("{prefix}.lock")).is_err());
            assert!(BranchName::try_parse(format!("{prefix}..{suffix}")).is_err());
            assert!(BranchName::try_parse(format!("{prefix}/.{suffix}")).is_err());
            assert!(BranchName::try_parse(format!("/{suffix}")).is_err());
            assert!(BranchName::try_parse(format!("{prefix}/")).is_err());
            assert!(BranchName::try_parse(format!("{prefix}@{{{suffix}}}")).is_err());
            assert!(BranchName::try_parse(format!("{prefix}{special_char}{suffix}")).is_err());
        }
    }

    #[test]
    fn empty_name_is_a_validation_error() {
        let err = BranchName::try_parse(String::new()).unwrap_err();
        assert!(matches!(
            RepositoryError::classify(&err),
            Some(RepositoryError::Validation(_))
        ));
    }

    #[test]
    fn sym_ref_names_render_short_forms() {
        let name = BranchName::try_parse("feature/x".to_string()).unwrap();

        assert_eq!(SymRefName::branch(&name).as_ref_path(), "refs/heads/feature/x");
        assert_eq!(SymRefName::branch(&name).short_name(), "feature/x");
        assert_eq!(SymRefName::tag(&name).short_name(), "tag: feature/x");
        assert_eq!(
            BranchName::try_parse_sym_ref_name(&SymRefName::branch(&name)).unwrap(),
            name
        );
    }
}
