/// User model for the group chat client.
/// A user is only a display identity; there are no credentials.

use serde::{Deserialize, Serialize};

use crate::ids;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

/// Profile handed out by the mock social login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockProfile {
    pub name: &'static str,
    pub avatar: &'static str,
}

pub const SOCIAL_PROFILES: [MockProfile; 5] = [
    MockProfile { name: "Nguyễn Văn An", avatar: "https://picsum.photos/seed/fb1/100/100" },
    MockProfile { name: "Lê Thị Bình", avatar: "https://picsum.photos/seed/fb2/100/100" },
    MockProfile { name: "Trần Văn Cường", avatar: "https://picsum.photos/seed/fb3/100/100" },
    MockProfile { name: "Phạm Thị Dung", avatar: "https://picsum.photos/seed/fb4/100/100" },
    MockProfile { name: "Đỗ Văn Em", avatar: "https://picsum.photos/seed/fb5/100/100" },
];

impl User {
    /// Id of the built-in administrator account
    pub const ADMIN_ID: &'static str = "u2";

    /// Sender id used for system announcements
    pub const SYSTEM_ID: &'static str = "sys";

    pub fn new(id: impl Into<String>, name: impl Into<String>, avatar: impl Into<String>) -> Self {
        User {
            id: id.into(),
            name: name.into(),
            avatar: avatar.into(),
            is_admin: None,
            is_verified: None,
            is_online: None,
        }
    }

    /// Fresh anonymous identity with a random `guest_` id
    pub fn guest() -> Self {
        User::new(ids::guest_id(), "You", "https://picsum.photos/seed/me/100/100")
    }

    pub fn admin() -> Self {
        User {
            id: Self::ADMIN_ID.to_string(),
            name: "Administrator".to_string(),
            avatar: "https://picsum.photos/seed/admin/100/100".to_string(),
            is_admin: Some(true),
            is_verified: Some(true),
            is_online: Some(true),
        }
    }

    pub fn system() -> Self {
        User::new(Self::SYSTEM_ID, "System", "")
    }

    /// Identity produced by the mock social login
    pub fn from_profile(profile: &MockProfile) -> Self {
        User {
            id: ids::social_id(),
            name: profile.name.to_string(),
            avatar: profile.avatar.to_string(),
            is_admin: Some(false),
            is_verified: None,
            is_online: Some(true),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }
}
