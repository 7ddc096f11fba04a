/// Group model for the group chat client.
/// `GroupRow` is the `groups` table; `Group` is the directory's view of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_timestamp, nullable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub member_count: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub admin_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_member_ids: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub member_count: i64,
    pub admin_id: String,
    pub rules: Vec<String>,
    pub pending_member_ids: Option<Vec<String>>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            name: row.name,
            avatar: row.avatar,
            description: row.description,
            member_count: row.member_count,
            admin_id: row.admin_id,
            rules: row.rules,
            pending_member_ids: row.pending_member_ids,
        }
    }
}

impl Group {
    /// Shown when the active group id is not (or no longer) in the directory
    pub fn placeholder() -> Self {
        Group {
            id: "global_community".to_string(),
            name: "Parents & Babies Community".to_string(),
            avatar: "https://picsum.photos/seed/group/200/200".to_string(),
            description: "A place to share parenting experience, nutrition advice and \
                          connect with other modern parents."
                .to_string(),
            member_count: 1250,
            admin_id: super::User::ADMIN_ID.to_string(),
            rules: vec![
                "Respect other members.".to_string(),
                "No spam or advertising.".to_string(),
                "Share knowledge that is accurate and curated.".to_string(),
                "Keep the language polite and civil.".to_string(),
            ],
            pending_member_ids: Some(Vec::new()),
        }
    }

    /// Default avatar for a newly created group
    pub fn default_avatar(group_id: &str) -> String {
        format!("https://picsum.photos/seed/{}/200/200", group_id)
    }
}
