/// Group directory: listing and creating groups.

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::ids;
use crate::models::{Group, GroupRow, User};
use std::sync::Arc;

/// Form contents for a new group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDraft {
    pub name: String,
    pub description: String,
    pub avatar: Option<String>,
    pub rules: Vec<String>,
}

impl GroupDraft {
    pub fn new(name: &str, description: &str) -> Self {
        GroupDraft {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    /// A group needs at least a name
    pub fn is_submittable(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

pub struct GroupDirectory<B> {
    backend: Arc<B>,
}

impl<B: Backend> GroupDirectory<B> {
    pub fn new(backend: Arc<B>) -> Self {
        GroupDirectory { backend }
    }

    /// All groups, newest first
    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let rows = self.backend.list_groups().await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    /// Create a group administered by `admin`. The creator counts as the
    /// first member.
    pub async fn create_group(&self, admin: &User, draft: GroupDraft) -> Result<Group> {
        if !draft.is_submittable() {
            return Err(ClientError::InvalidGroup(
                "Group name cannot be empty".to_string(),
            ));
        }

        let id = ids::group_id();
        let avatar = draft
            .avatar
            .filter(|avatar| !avatar.trim().is_empty())
            .unwrap_or_else(|| Group::default_avatar(&id));

        let row = GroupRow {
            id,
            name: draft.name.trim().to_string(),
            avatar,
            description: draft.description.trim().to_string(),
            member_count: 1,
            admin_id: admin.id.clone(),
            rules: draft.rules,
            pending_member_ids: None,
            created_at: None,
        };

        self.backend.insert_group(row.clone()).await?;
        log::info!("{} created group {} ({})", admin.id, row.name, row.id);

        Ok(Group::from(row))
    }
}
