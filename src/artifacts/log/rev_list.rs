use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::{BinaryHeap, HashSet};

/// Lazy newest-first walk over every ancestor of a set of starting commits
///
/// Commits are yielded in committer-time order, ties broken by object id, and
/// each at most once however many paths lead to it.
pub struct RevList<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
    queue: BinaryHeap<SlimCommit>,
    visited: HashSet<ObjectId>,
    failed: bool,
}

impl<CommitLoaderFn> RevList<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    pub fn new(
        commit_loader: CommitLoaderFn,
        starts: impl IntoIterator<Item = ObjectId>,
    ) -> anyhow::Result<Self> {
        let mut rev_list = RevList {
            commit_loader,
            queue: BinaryHeap::new(),
            visited: HashSet::new(),
            failed: false,
        };

        for start in starts {
            rev_list.enqueue(&start)?;
        }

        Ok(rev_list)
    }

    fn enqueue(&mut self, oid: &ObjectId) -> anyhow::Result<()> {
        if self.visited.insert(oid.clone()) {
            self.queue.push((self.commit_loader)(oid)?);
        }

        Ok(())
    }
}

impl<CommitLoaderFn> Iterator for RevList<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    type Item = anyhow::Result<SlimCommit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let commit = self.queue.pop()?;
        for parent in &commit.parents {
            if let Err(err) = self.enqueue(parent) {
                self.failed = true;
                return Some(Err(err));
            }
        }

        Some(Ok(commit))
    }
}

/// Whether `ancestor` is reachable from `descendant` through parent links
///
/// A commit counts as its own ancestor. Commit dates play no part: the whole
/// history of `descendant` is searched.
pub fn is_ancestor<CommitLoaderFn>(
    commit_loader: CommitLoaderFn,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> anyhow::Result<bool>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    let target = commit_loader(ancestor)?;

    for commit in RevList::new(commit_loader, [descendant.clone()])? {
        let commit = commit?;
        if commit.oid == target.oid {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use std::collections::HashMap;

    struct Graph {
        commits: HashMap<ObjectId, SlimCommit>,
    }

    impl Graph {
        fn load(&self, oid: &ObjectId) -> anyhow::Result<SlimCommit> {
            self.commits
                .get(oid)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown commit {oid}"))
        }

        fn walk(&self, starts: &[&str]) -> Vec<String> {
            RevList::new(|oid| self.load(oid), starts.iter().map(|name| oid(name)))
                .unwrap()
                .map(|commit| name_of(&commit.unwrap().oid))
                .collect()
        }
    }

    fn oid(name: &str) -> ObjectId {
        ObjectId::digest(name.as_bytes())
    }

    fn name_of(oid: &ObjectId) -> String {
        ["a", "b", "c", "d", "e", "root2"]
            .into_iter()
            .find(|name| &self::oid(name) == oid)
            .unwrap_or("?")
            .to_string()
    }

    /// a <- b <- d, a <- c <- d (merge), root2 unrelated; one hour apart in that order
    #[fixture]
    fn graph() -> Graph {
        let edges: [(&str, &[&str]); 6] = [
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
            ("root2", &[]),
            ("e", &["d"]),
        ];

        let commits = edges
            .iter()
            .enumerate()
            .map(|(hour, (name, parents))| {
                let timestamp = FixedOffset::east_opt(0)
                    .unwrap()
                    .timestamp_opt(1_700_000_000 + hour as i64 * 3600, 0)
                    .unwrap();
                let commit = SlimCommit {
                    oid: oid(name),
                    parents: parents.iter().map(|parent| oid(parent)).collect(),
                    timestamp,
                };
                (commit.oid.clone(), commit)
            })
            .collect();

        Graph { commits }
    }

    #[rstest]
    fn merge_history_is_walked_newest_first_once(graph: Graph) {
        assert_eq!(graph.walk(&["e"]), vec!["e", "d", "c", "b", "a"]);
    }

    #[rstest]
    fn several_starts_share_one_visited_set(graph: Graph) {
        assert_eq!(graph.walk(&["root2", "b", "c"]), vec!["root2", "c", "b", "a"]);
    }

    #[rstest]
    #[case("a", "e", true)]
    #[case("c", "d", true)]
    #[case("d", "d", true)]
    #[case("e", "a", false)]
    #[case("root2", "e", false)]
    #[case("b", "c", false)]
    fn ancestry(graph: Graph, #[case] ancestor: &str, #[case] descendant: &str, #[case] expected: bool) {
        let result = is_ancestor(|oid| graph.load(oid), &oid(ancestor), &oid(descendant)).unwrap();

        assert_eq!(result, expected);
    }

    #[rstest]
    fn missing_parent_surfaces_as_an_error(mut graph: Graph) {
        graph.commits.remove(&oid("a"));

        let results = RevList::new(|oid| graph.load(oid), [oid("b")])
            .unwrap()
            .collect::<Vec<_>>();

        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[rstest]
    fn backdated_child_still_descends_from_its_parent(mut graph: Graph) {
        let week_before_root = graph.commits[&oid("a")].timestamp - chrono::Duration::days(7);
        let child = SlimCommit {
            oid: oid("skewed"),
            parents: vec![oid("e")],
            timestamp: week_before_root,
        };
        graph.commits.insert(child.oid.clone(), child);

        assert!(is_ancestor(|oid| graph.load(oid), &oid("e"), &oid("skewed")).unwrap());
        assert!(is_ancestor(|oid| graph.load(oid), &oid("a"), &oid("skewed")).unwrap());
    }
}
