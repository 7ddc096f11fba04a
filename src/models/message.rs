/// Message model for the group chat client.
/// Messages are never edited or deleted once the backend accepts them.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_timestamp, nullable, User};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Chat,
    System,
}

/// A row of the `messages` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub sender_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub sender_avatar: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub images: Vec<String>,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: MessageKind,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender: User,
    pub text: Option<String>,
    pub images: Vec<String>,
    /// Local `HH:MM`
    pub timestamp: String,
    /// Derived from the current user, never stored
    pub is_me: bool,
    pub kind: MessageKind,
}

impl Message {
    /// Convert a backend row, deriving `is_me` from the viewing user's id
    pub fn from_row(row: MessageRow, me: &str) -> Self {
        let timestamp = format_timestamp(row.created_at.unwrap_or_else(Utc::now));
        let is_me = row.sender_id == me;

        Message {
            id: row.id,
            sender: User::new(row.sender_id, row.sender_name, row.sender_avatar),
            text: row.text,
            images: row.images,
            timestamp,
            is_me,
            kind: row.kind,
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}

/// Render a timestamp as local wall-clock `HH:MM`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}
