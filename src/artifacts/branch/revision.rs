use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, HEAD_REF_NAME, SymRefName};
use crate::artifacts::branch::{ANCESTOR_REGEX, PARENT_REGEX, REF_ALIASES};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepositoryError;
use anyhow::Context;

const MIN_ABBREVIATED_OID: usize = 4;
const FULL_OID: usize = 40;

/// Revision expression naming a commit
///
/// - ref names: `master`, `feature/login`, `v1.0`, `HEAD`, and `@` for `HEAD`
/// - full or abbreviated (at least 4 hex digits) object ids
/// - `<rev>^` for the first parent, `<rev>~<n>` for the n-th first-parent ancestor
///
/// Names are looked up as branches first, then tags, and only then as object id
/// prefixes. Annotated tags are peeled to the commit they point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Ref(BranchName),
    Ancestor(Box<Revision>, usize),
    Parent(Box<Revision>),
}

impl Revision {
    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        let parent_regex = regex::Regex::new(PARENT_REGEX)
            .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?;
        let ancestor_regex = regex::Regex::new(ANCESTOR_REGEX)
            .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?;

        if let Some(caps) = parent_regex.captures(revision) {
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Parent(Box::new(base_revision)))
        } else if let Some(caps) = ancestor_regex.captures(revision) {
            let generations = caps[2].parse::<usize>().map_err(|_| {
                RepositoryError::validation(format!("invalid ancestor count in '{revision}'"))
            })?;
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Ancestor(Box::new(base_revision), generations))
        } else {
            let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);

            Ok(Revision::Ref(BranchName::try_parse(resolved_name.to_string())?))
        }
    }

    /// Commit the expression names
    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        match self {
            Revision::Ref(name) => {
                let oid = Self::resolve_name(name, repository)?;
                repository.database().peel_to_commit(&oid)
            }
            Revision::Parent(base_revision) => {
                Self::first_parent(&base_revision.resolve(repository)?, repository)
            }
            Revision::Ancestor(base_revision, generations) => {
                let mut oid = base_revision.resolve(repository)?;
                for _ in 0..*generations {
                    oid = Self::first_parent(&oid, repository)?;
                }

                Ok(oid)
            }
        }
    }

    fn resolve_name(name: &BranchName, repository: &Repository) -> anyhow::Result<ObjectId> {
        let refs = repository.refs();

        if name.as_ref() == HEAD_REF_NAME {
            return refs.resolve_head();
        }
        if let Some(oid) = refs.read_ref(&SymRefName::branch(name))? {
            return Ok(oid);
        }
        if let Some(oid) = refs.read_ref(&SymRefName::tag(name))? {
            return Ok(oid);
        }
        if Self::looks_like_oid(name.as_ref()) {
            return Self::resolve_oid(name.as_ref(), repository);
        }

        Err(RepositoryError::not_found(format!("revision '{name}'")))
    }

    fn first_parent(oid: &ObjectId, repository: &Repository) -> anyhow::Result<ObjectId> {
        let commit = repository.database().parse_object_as_commit(oid)?;

        commit
            .parent()
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("parent of {}", oid.to_short_oid())))
    }

    fn resolve_oid(prefix: &str, repository: &Repository) -> anyhow::Result<ObjectId> {
        let database = repository.database();
        let matches = database.find_objects_by_prefix(prefix)?;

        let candidates = if matches.len() > 1 {
            // commits and tags win over trees and blobs sharing the prefix
            matches
                .into_iter()
                .filter(|oid| {
                    matches!(
                        database.object_type(oid),
                        Ok(ObjectType::Commit | ObjectType::Tag)
                    )
                })
                .collect::<Vec<_>>()
        } else {
            matches
        };

        match candidates.as_slice() {
            [] => Err(RepositoryError::not_found(format!("revision '{prefix}'"))),
            [oid] => Ok(oid.clone()),
            _ => {
                let hints = candidates
                    .iter()
                    .map(|oid| format!("  {}", oid.to_short_oid()))
                    .collect::<Vec<_>>()
                    .join("\n");

                Err(RepositoryError::validation(format!(
                    "short object id {prefix} is ambiguous; candidates are:\n{hints}"
                )))
            }
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        (MIN_ABBREVIATED_OID..=FULL_OID).contains(&s.len())
            && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn reference(name: &str) -> Revision {
        Revision::Ref(BranchName::try_parse(name.to_string()).unwrap())
    }

    #[rstest]
    #[case("master", reference("master"))]
    #[case("@", reference("HEAD"))]
    #[case("feature/login", reference("feature/login"))]
    #[case("master^", Revision::Parent(Box::new(reference("master"))))]
    #[case("HEAD~3", Revision::Ancestor(Box::new(reference("HEAD")), 3))]
    #[case("@^^", Revision::Parent(Box::new(Revision::Parent(Box::new(reference("HEAD"))))))]
    #[case("abc123~0", Revision::Ancestor(Box::new(reference("abc123")), 0))]
    fn parses_expressions(#[case] input: &str, #[case] expected: Revision) {
        assert_eq!(Revision::try_parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("invalid name")]
    #[case("invalid:name")]
    #[case(".hidden")]
    #[case("/rooted")]
    #[case("trailing/")]
    #[case("name.lock")]
    #[case("a..b")]
    #[case("bad name^")]
    #[case("bad:name~2")]
    fn rejects_invalid_names(#[case] input: &str) {
        assert!(Revision::try_parse(input).is_err());
    }

    #[rstest]
    #[case("abcd", true)]
    #[case("abc", false)]
    #[case("0123456789abcdef0123456789abcdef01234567", true)]
    #[case("0123456789abcdef0123456789abcdef012345678", false)]
    #[case("master", false)]
    fn oid_lookalikes(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(Revision::looks_like_oid(input), expected);
    }

    fn valid_branch_name_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,15}(/[a-zA-Z0-9_-]{1,8})?"
    }

    proptest! {
        #[test]
        fn parent_suffix_wraps_the_base(name in valid_branch_name_strategy()) {
            let parsed = Revision::try_parse(&format!("{name}^")).unwrap();

            prop_assert_eq!(parsed, Revision::Parent(Box::new(reference(&name))));
        }

        #[test]
        fn ancestor_suffix_carries_the_count(name in valid_branch_name_strategy(), n in 0usize..1000) {
            let parsed = Revision::try_parse(&format!("{name}~{n}")).unwrap();

            prop_assert_eq!(parsed, Revision::Ancestor(Box::new(reference(&name)), n));
        }
    }
}
