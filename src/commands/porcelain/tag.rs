use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use std::io::Write;

impl Repository {
    /// Tag a commit, lightweight or annotated when a message is given
    ///
    /// Returns the id the tag ref points at: the commit itself, or the tag object.
    pub async fn tag(
        &mut self,
        tag_name: &str,
        target: Option<&str>,
        message: Option<&str>,
    ) -> anyhow::Result<ObjectId> {
        let _lock = self.lock()?;

        let tag_name = BranchName::try_parse(tag_name.to_string())?;
        let target_oid = Revision::try_parse(target.unwrap_or("HEAD"))?.resolve(self)?;

        let ref_target = match message {
            Some(message) => {
                let tag = Tag::new(
                    target_oid,
                    ObjectType::Commit,
                    tag_name.to_string(),
                    Author::load_from_env(),
                    message.trim().to_string(),
                );
                self.database().store(&tag)?
            }
            None => target_oid,
        };

        self.refs().create_tag(&tag_name, &ref_target)?;

        Ok(ref_target)
    }

    pub async fn list_tags(&mut self) -> anyhow::Result<()> {
        self.ensure_initialized()?;

        for (tag_name, _) in self.refs().list_tags()? {
            writeln!(self.writer(), "{tag_name}")?;
        }

        Ok(())
    }

    pub async fn delete_tags(&mut self, tag_names: &[String]) -> anyhow::Result<()> {
        let _lock = self.lock()?;

        for tag_name in tag_names {
            let tag_name = BranchName::try_parse(tag_name.to_string())?;
            let oid = self.refs().delete_tag(&tag_name)?;

            writeln!(
                self.writer(),
                "Deleted tag '{}' (was {})",
                tag_name,
                oid.to_short_oid()
            )?;
        }

        Ok(())
    }
}
