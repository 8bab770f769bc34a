use crate::areas::database::Database;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::HashSet;

/// Every object reachable from `roots`: commits and their ancestors, their trees,
/// every blob beneath them, and the tags along the way
///
/// Each object is loaded at most once however many roots reach it.
pub fn reachable_set(
    database: &Database,
    roots: impl IntoIterator<Item = ObjectId>,
) -> anyhow::Result<HashSet<ObjectId>> {
    let mut reachable = HashSet::new();
    let mut pending = roots.into_iter().collect::<Vec<_>>();

    while let Some(oid) = pending.pop() {
        if !reachable.insert(oid.clone()) {
            continue;
        }

        match database.parse_object(&oid)? {
            ObjectBox::Blob(_) => {}
            ObjectBox::Tree(tree) => {
                pending.extend(tree.into_entries().map(|(_, entry)| entry.oid));
            }
            ObjectBox::Commit(commit) => {
                pending.push(commit.tree_oid().clone());
                pending.extend(commit.parents().iter().cloned());
            }
            ObjectBox::Tag(tag) => pending.push(tag.target().clone()),
        }
    }

    Ok(reachable)
}
