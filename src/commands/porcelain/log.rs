use crate::areas::refs::Head;
use crate::areas::repository::Repository;
use crate::artifacts::branch::TAGS_PREFIX;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub max_count: Option<usize>,
    pub oneline: bool,
}

impl Repository {
    /// History reachable from HEAD, newest first
    pub async fn log(&mut self, options: LogOptions) -> anyhow::Result<()> {
        self.ensure_initialized()?;

        let head = self.refs().head()?;
        let head_oid = self.refs().read_head()?.ok_or_else(|| {
            RepositoryError::not_found(format!("commits on '{}'", head.describe()))
        })?;
        let reverse_refs = self.decorations()?;

        let rev_list = RevList::new(
            |oid: &ObjectId| self.database().load_slim_commit(oid),
            [head_oid],
        )?;

        for (position, slim) in rev_list.enumerate() {
            if options.max_count.is_some_and(|max_count| position >= max_count) {
                break;
            }

            let slim = slim?;
            let commit = self.database().parse_object_as_commit(&slim.oid)?;
            let decoration = decoration(&slim.oid, &head, &reverse_refs);

            if options.oneline {
                self.show_commit_oneline(&slim.oid, &commit, &decoration)?;
            } else {
                if position > 0 {
                    writeln!(self.writer())?;
                }
                self.show_commit_medium(&slim.oid, &commit, &decoration)?;
            }
        }

        Ok(())
    }

    /// Refs keyed by the commit they end up at, so annotated tags decorate their target
    fn decorations(&self) -> anyhow::Result<HashMap<ObjectId, Vec<SymRefName>>> {
        let mut decorations = HashMap::<ObjectId, Vec<SymRefName>>::new();

        for (oid, ref_names) in self.refs().reverse_refs()? {
            let commit_oid = self.database().peel(&oid)?;
            decorations.entry(commit_oid).or_default().extend(ref_names);
        }

        Ok(decorations)
    }

    fn show_commit_medium(
        &self,
        oid: &ObjectId,
        commit: &Commit,
        decoration: &str,
    ) -> anyhow::Result<()> {
        writeln!(
            self.writer(),
            "{}{}",
            format!("commit {oid}").yellow(),
            decoration
        )?;
        if commit.is_merge() {
            let parents = commit
                .parents()
                .iter()
                .map(ObjectId::to_short_oid)
                .collect::<Vec<_>>();
            writeln!(self.writer(), "Merge: {}", parents.join(" "))?;
        }
        writeln!(self.writer(), "Author: {}", commit.author().display_name())?;
        writeln!(
            self.writer(),
            "Date:   {}",
            commit.author().readable_timestamp()
        )?;
        writeln!(self.writer())?;
        for message_line in commit.message().lines() {
            writeln!(self.writer(), "    {message_line}")?;
        }

        Ok(())
    }

    fn show_commit_oneline(
        &self,
        oid: &ObjectId,
        commit: &Commit,
        decoration: &str,
    ) -> anyhow::Result<()> {
        writeln!(
            self.writer(),
            "{}{} {}",
            oid.to_short_oid().yellow(),
            decoration,
            commit.short_message()
        )?;

        Ok(())
    }
}

/// ` (HEAD -> master, tag: v1.0, topic)` for a commit some refs point at
fn decoration(
    oid: &ObjectId,
    head: &Head,
    reverse_refs: &HashMap<ObjectId, Vec<SymRefName>>,
) -> String {
    let Some(ref_names) = reverse_refs.get(oid) else {
        return String::new();
    };

    let current = head.branch().map(SymRefName::branch);
    let mut names = Vec::new();

    for ref_name in ref_names {
        if ref_name.is_head() {
            if matches!(head, Head::Detached(_)) {
                names.insert(0, "HEAD".cyan().bold().to_string());
            }
            continue;
        }

        if current.as_ref() == Some(ref_name) {
            names.insert(
                0,
                format!("{} -> {}", "HEAD".cyan().bold(), ref_name.short_name().green().bold()),
            );
        } else if ref_name.as_ref_path().starts_with(TAGS_PREFIX) {
            names.push(ref_name.short_name().yellow().bold().to_string());
        } else {
            names.push(ref_name.short_name().green().bold().to_string());
        }
    }

    if names.is_empty() {
        String::new()
    } else {
        format!(" ({})", names.join(", "))
    }
}
