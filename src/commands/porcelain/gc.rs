use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::log::reachability::reachable_set;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::io::Write;
use tracing::{debug, info};

/// What a collection found and removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcSummary {
    pub reachable: usize,
    pub removed_objects: usize,
    pub removed_temp_files: usize,
    pub pruned_dirs: usize,
}

impl Repository {
    /// Mark every object reachable from a root, then delete the rest
    ///
    /// Roots are branches, tags, HEAD, stash entries, everything staged in the
    /// index and the incoming commit of a pending merge or cherry-pick.
    pub async fn gc(&mut self) -> anyhow::Result<GcSummary> {
        let _lock = self.lock()?;

        let roots = self.gc_roots().await?;
        debug!(roots = roots.len(), "collecting garbage");

        let reachable = reachable_set(self.database(), roots)?;

        let mut summary = GcSummary {
            reachable: reachable.len(),
            ..Default::default()
        };

        for oid in self.database().list_object_ids()? {
            if !reachable.contains(&oid) {
                self.database().delete(&oid)?;
                summary.removed_objects += 1;
            }
        }

        for temp_file in self.database().temp_files()? {
            std::fs::remove_file(&temp_file)
                .with_context(|| format!("unable to remove {}", temp_file.display()))?;
            summary.removed_temp_files += 1;
        }
        summary.pruned_dirs = self.database().prune_empty_dirs()?;

        info!(
            reachable = summary.reachable,
            removed = summary.removed_objects,
            temp_files = summary.removed_temp_files,
            pruned_dirs = summary.pruned_dirs,
            "garbage collected"
        );
        writeln!(
            self.writer(),
            "Removed {} unreachable object(s), kept {}",
            summary.removed_objects,
            summary.reachable
        )?;

        Ok(summary)
    }

    async fn gc_roots(&self) -> anyhow::Result<Vec<ObjectId>> {
        let refs = self.refs();
        let mut roots = Vec::new();

        for branch in refs.list_branches()? {
            roots.extend(refs.read_ref(&SymRefName::branch(&branch))?);
        }
        roots.extend(refs.list_tags()?.into_iter().map(|(_, oid)| oid));
        roots.extend(refs.read_head()?);
        roots.extend(self.stash_stack()?);

        if let Some(state) = self.merge_state()? {
            roots.push(state.incoming);
        }

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        roots.extend(index.entries().map(|entry| entry.oid.clone()));

        Ok(roots)
    }
}
