//! Message synchronisation for the active chat room.
//!
//! The visible list is built from three sources: the history loaded when a
//! room is entered, optimistic entries added the moment the user sends, and
//! realtime inserts pushed by the backend. Message ids are generated client
//! side, so the realtime echo of an optimistic entry is recognised by id and
//! dropped. A failed send removes its optimistic entry; nothing is retried.

use crate::backend::Backend;
use crate::error::Result;
use crate::ids;
use crate::models::{format_timestamp, Message, MessageKind, MessageRow, User};
use chrono::Utc;
use std::sync::Arc;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Validated content of a message about to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    text: Option<String>,
    images: Vec<String>,
}

impl OutgoingMessage {
    /// `None` when there is nothing to send: blank text and no images
    pub fn new(text: &str, images: Vec<String>) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() && images.is_empty() {
            return None;
        }

        Some(OutgoingMessage {
            text: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            images,
        })
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// The entry shown locally before the backend confirms
    pub fn to_optimistic(&self, id: &str, sender: &User) -> Message {
        Message {
            id: id.to_string(),
            sender: sender.clone(),
            text: self.text.clone(),
            images: self.images.clone(),
            timestamp: format_timestamp(Utc::now()),
            is_me: true,
            kind: MessageKind::Chat,
        }
    }

    /// The row handed to the backend; `created_at` is left to the server
    pub fn into_row(self, id: &str, group_id: &str, sender: &User) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            group_id: group_id.to_string(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            sender_avatar: sender.avatar.clone(),
            text: self.text,
            images: self.images,
            kind: MessageKind::Chat,
            created_at: None,
        }
    }
}

/// Result of a fire-and-forget send
#[derive(Debug)]
pub struct SendOutcome {
    pub group_id: String,
    pub message_id: String,
    pub result: Result<()>,
}

/// The message list of the active room
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Replace the list with freshly loaded history (rows oldest first)
    pub fn replace_history(&mut self, rows: Vec<MessageRow>, me: &str) {
        self.messages = rows
            .into_iter()
            .map(|row| Message::from_row(row, me))
            .collect();
    }

    pub fn push_optimistic(&mut self, mut message: Message) {
        message.is_me = true;
        self.messages.push(message);
    }

    /// Append a realtime insert unless a message with that id is already
    /// shown. Returns whether the list changed.
    pub fn apply_remote(&mut self, row: MessageRow, me: &str) -> bool {
        if self.contains(&row.id) {
            log::debug!("Dropping realtime echo of {}", row.id);
            return false;
        }
        self.messages.push(Message::from_row(row, me));
        true
    }

    /// Remove an entry by id. Returns whether it was present.
    pub fn rollback(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Apply a send outcome: a failure removes the optimistic entry.
    /// Returns whether the list changed.
    pub fn settle(&mut self, outcome: &SendOutcome) -> bool {
        match &outcome.result {
            Ok(()) => {
                log::debug!("Message {} accepted", outcome.message_id);
                false
            }
            Err(e) => {
                log::error!("Error sending message {}: {}", outcome.message_id, e);
                self.rollback(&outcome.message_id)
            }
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// History loading and sending against the backend
pub struct MessageSync<B> {
    backend: Arc<B>,
    history_limit: usize,
}

impl<B: Backend> MessageSync<B> {
    pub fn new(backend: Arc<B>, history_limit: usize) -> Self {
        MessageSync {
            backend,
            history_limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// The most recent `history_limit` messages of a group, oldest first
    pub async fn load_history(&self, group_id: &str) -> Result<Vec<MessageRow>> {
        let rows = self
            .backend
            .recent_messages(group_id, self.history_limit)
            .await?;
        log::debug!("Loaded {} messages for {}", rows.len(), group_id);
        Ok(rows)
    }

    /// Append an optimistic entry to `log` and start the insert in the
    /// background. `on_settled` receives the outcome once the backend
    /// answers. Returns the id of the new message.
    pub fn send<F>(
        &self,
        log: &mut MessageLog,
        group_id: &str,
        sender: &User,
        outgoing: OutgoingMessage,
        on_settled: F,
    ) -> String
    where
        F: FnOnce(SendOutcome) + Send + 'static,
    {
        let message_id = ids::message_id();
        log.push_optimistic(outgoing.to_optimistic(&message_id, sender));

        let row = outgoing.into_row(&message_id, group_id, sender);
        let backend = Arc::clone(&self.backend);
        let group_id = group_id.to_string();
        let id = message_id.clone();

        tokio::spawn(async move {
            let result = backend.insert_message(row).await;
            on_settled(SendOutcome {
                group_id,
                message_id: id,
                result,
            });
        });

        message_id
    }
}
