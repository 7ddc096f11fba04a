/// In-process backend.
///
/// Keeps the three tables in memory and fans row changes out over a
/// broadcast channel, mimicking the hosted service closely enough for the
/// offline mode and for tests. Failures can be injected per operation class.

use super::{Backend, ChangeEvent, Subscription};
use crate::error::{ClientError, Result};
use crate::models::{
    GroupRow, MemberRequest, MessageKind, MessageRow, RequestStatus, User,
};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

const CHANGE_BUFFER: usize = 256;

#[derive(Default)]
struct Tables {
    groups: Vec<GroupRow>,
    messages: Vec<MessageRow>,
    member_requests: Vec<MemberRequest>,
    next_request_id: u64,
}

pub struct MemoryBackend {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<(String, ChangeEvent)>,
    offline: AtomicBool,
    reject_messages: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        MemoryBackend {
            tables: Mutex::new(Tables::default()),
            changes,
            offline: AtomicBool::new(false),
            reject_messages: AtomicBool::new(false),
        }
    }

    /// A backend holding one community group with a short history
    pub fn with_demo_data() -> Self {
        let backend = Self::new();
        let now = Utc::now();
        let group = crate::models::Group::placeholder();

        if let Ok(mut tables) = backend.tables.lock() {
            tables.groups.push(GroupRow {
                id: group.id.clone(),
                name: group.name,
                avatar: group.avatar,
                description: group.description,
                member_count: group.member_count,
                admin_id: group.admin_id,
                rules: group.rules,
                pending_member_ids: group.pending_member_ids,
                created_at: Some(now - Duration::days(30)),
            });

            let system = User::system();
            tables.messages.push(MessageRow {
                id: "1".to_string(),
                group_id: group.id.clone(),
                sender_id: system.id,
                sender_name: system.name,
                sender_avatar: system.avatar,
                text: Some("Minh Thư joined the group".to_string()),
                images: Vec::new(),
                kind: MessageKind::System,
                created_at: Some(now - Duration::minutes(2)),
            });
            tables.messages.push(MessageRow {
                id: "2".to_string(),
                group_id: group.id,
                sender_id: "u1".to_string(),
                sender_name: "Minh Thư".to_string(),
                sender_avatar: "https://picsum.photos/seed/u1/100/100".to_string(),
                text: Some(
                    "Hi everyone! My baby is 3 months old and I'm reading up on weaning."
                        .to_string(),
                ),
                images: Vec::new(),
                kind: MessageKind::Chat,
                created_at: Some(now - Duration::minutes(1)),
            });
        }

        backend
    }

    /// Fail every operation while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail message inserts only while set
    pub fn reject_messages(&self, reject: bool) {
        self.reject_messages.store(reject, Ordering::SeqCst);
    }

    /// Snapshot of the stored messages of a group, in insertion order
    pub fn stored_messages(&self, group_id: &str) -> Vec<MessageRow> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .messages
                    .iter()
                    .filter(|m| m.group_id == group_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stored_group(&self, group_id: &str) -> Option<GroupRow> {
        self.tables
            .lock()
            .ok()?
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
    }

    pub fn stored_requests(&self, group_id: &str) -> Vec<MemberRequest> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .member_requests
                    .iter()
                    .filter(|r| r.group_id == group_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::ServerError("backend unreachable".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ClientError::StorageError("Failed to lock tables".to_string()))
    }

    fn publish(&self, group_id: &str, change: ChangeEvent) {
        // No receivers is not an error: nobody is subscribed yet.
        let _ = self.changes.send((group_id.to_string(), change));
    }
}

impl Backend for MemoryBackend {
    async fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.check_online()?;
        let tables = self.lock()?;

        let mut groups: Vec<GroupRow> = tables.groups.iter().rev().cloned().collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn insert_group(&self, mut group: GroupRow) -> Result<()> {
        self.check_online()?;
        let mut tables = self.lock()?;

        if tables.groups.iter().any(|g| g.id == group.id) {
            return Err(ClientError::ServerError(format!(
                "duplicate key value violates unique constraint \"groups_pkey\": {}",
                group.id
            )));
        }

        group.created_at.get_or_insert_with(Utc::now);
        tables.groups.push(group);
        Ok(())
    }

    async fn update_member_count(&self, group_id: &str, member_count: i64) -> Result<()> {
        self.check_online()?;
        let mut tables = self.lock()?;

        // Like a filtered PATCH, matching no rows is not an error.
        if let Some(group) = tables.groups.iter_mut().find(|g| g.id == group_id) {
            group.member_count = member_count;
        }
        Ok(())
    }

    async fn recent_messages(&self, group_id: &str, limit: usize) -> Result<Vec<MessageRow>> {
        self.check_online()?;
        let tables = self.lock()?;

        let mut rows: Vec<MessageRow> = tables
            .messages
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let skip = rows.len().saturating_sub(limit);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn insert_message(&self, mut message: MessageRow) -> Result<()> {
        self.check_online()?;
        if self.reject_messages.load(Ordering::SeqCst) {
            return Err(ClientError::ServerError(
                "new row violates row-level security policy for table \"messages\"".to_string(),
            ));
        }

        {
            let mut tables = self.lock()?;
            if tables.messages.iter().any(|m| m.id == message.id) {
                return Err(ClientError::ServerError(format!(
                    "duplicate key value violates unique constraint \"messages_pkey\": {}",
                    message.id
                )));
            }
            message.created_at.get_or_insert_with(Utc::now);
            tables.messages.push(message.clone());
        }

        let group_id = message.group_id.clone();
        self.publish(&group_id, ChangeEvent::MessageInserted(message));
        Ok(())
    }

    async fn member_requests(
        &self,
        group_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<MemberRequest>> {
        self.check_online()?;
        let tables = self.lock()?;

        Ok(tables
            .member_requests
            .iter()
            .filter(|r| r.group_id == group_id && r.status == status)
            .cloned()
            .collect())
    }

    async fn find_member_request(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRequest>> {
        self.check_online()?;
        let tables = self.lock()?;

        Ok(tables
            .member_requests
            .iter()
            .rev()
            .find(|r| r.group_id == group_id && r.user_id == user_id)
            .cloned())
    }

    async fn insert_member_request(&self, mut request: MemberRequest) -> Result<()> {
        self.check_online()?;

        {
            let mut tables = self.lock()?;
            tables.next_request_id += 1;
            request.id = Some(tables.next_request_id.to_string());
            tables.member_requests.push(request.clone());
        }

        let group_id = request.group_id.clone();
        self.publish(&group_id, ChangeEvent::MemberRequestChanged(request));
        Ok(())
    }

    async fn update_member_request_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<()> {
        self.check_online()?;

        let updated = {
            let mut tables = self.lock()?;
            tables
                .member_requests
                .iter_mut()
                .find(|r| r.id.as_deref() == Some(request_id))
                .map(|request| {
                    request.status = status;
                    request.clone()
                })
        };

        if let Some(request) = updated {
            let group_id = request.group_id.clone();
            self.publish(&group_id, ChangeEvent::MemberRequestChanged(request));
        }
        Ok(())
    }

    async fn subscribe(&self, group_id: &str) -> Result<Subscription> {
        self.check_online()?;

        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let filter = group_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok((group_id, change)) if group_id == filter => {
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Realtime feed for {} lagged, {} changes lost", filter, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(group_id, rx, Some(task)))
    }
}
