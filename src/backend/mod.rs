/// Hosted backend access.
///
/// The client never talks to a database directly; it goes through `Backend`,
/// which offers row operations over the `groups`, `messages` and
/// `member_requests` tables plus a per-group realtime subscription.

pub mod memory;
pub mod realtime;
pub mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

use crate::error::Result;
use crate::models::{GroupRow, MemberRequest, MessageRow, RequestStatus};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A row change pushed by the realtime channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    MessageInserted(MessageRow),
    MemberRequestChanged(MemberRequest),
}

/// Live realtime feed for one group.
///
/// Dropping the subscription stops the task that feeds it.
pub struct Subscription {
    group_id: String,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        group_id: &str,
        receiver: mpsc::UnboundedReceiver<ChangeEvent>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Subscription {
            group_id: group_id.to_string(),
            receiver,
            task,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Next change, or `None` once the channel has closed
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        log::debug!("Realtime subscription for {} closed", self.group_id);
    }
}

pub trait Backend: Send + Sync + 'static {
    /// All groups, newest first
    fn list_groups(&self) -> impl Future<Output = Result<Vec<GroupRow>>> + Send;

    fn insert_group(&self, group: GroupRow) -> impl Future<Output = Result<()>> + Send;

    fn update_member_count(
        &self,
        group_id: &str,
        member_count: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Up to `limit` most recent messages of a group, oldest first
    fn recent_messages(
        &self,
        group_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MessageRow>>> + Send;

    fn insert_message(&self, message: MessageRow) -> impl Future<Output = Result<()>> + Send;

    fn member_requests(
        &self,
        group_id: &str,
        status: RequestStatus,
    ) -> impl Future<Output = Result<Vec<MemberRequest>>> + Send;

    /// The most recent request `user_id` filed against `group_id`, if any
    fn find_member_request(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<MemberRequest>>> + Send;

    fn insert_member_request(
        &self,
        request: MemberRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_member_request_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Open the realtime feed of message inserts and join-request changes
    /// for one group
    fn subscribe(&self, group_id: &str) -> impl Future<Output = Result<Subscription>> + Send;
}
