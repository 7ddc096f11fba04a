//! Join requests and admin approval.
//!
//! Joining is a mock social login: the visitor gets one of a fixed set of
//! profiles, the identity is stored in the session and a pending request is
//! filed against the active group. An admin approves the request, which bumps
//! the group's member count and posts a system announcement.
//!
//! Approval is not idempotent. The new count is the caller's view of the
//! group plus one, so approving the same request twice counts the member
//! twice. Admin rights are decided on the client only.

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::ids;
use crate::models::{
    Group, MemberRequest, MessageKind, MessageRow, RequestStatus, User, SOCIAL_PROFILES,
};
use crate::session::SessionStore;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Whether `user` may administer `group`
pub fn is_group_admin(user: &User, group: &Group) -> bool {
    user.is_admin() || group.admin_id == user.id
}

/// Text of the system message posted on approval
pub fn join_announcement(user_name: &str) -> String {
    format!("{} joined the community! 👋", user_name)
}

/// A random identity from the mock social login
pub fn pick_social_identity() -> User {
    let profile = SOCIAL_PROFILES
        .choose(&mut rand::thread_rng())
        .unwrap_or(&SOCIAL_PROFILES[0]);
    User::from_profile(profile)
}

pub struct MembershipFlow<B> {
    backend: Arc<B>,
}

impl<B: Backend> MembershipFlow<B> {
    pub fn new(backend: Arc<B>) -> Self {
        MembershipFlow { backend }
    }

    /// Log in through the mock social provider. The new identity is stored in
    /// the session; when a group is active a pending join request is filed.
    pub async fn join_with_social(
        &self,
        session: &SessionStore,
        group_id: Option<&str>,
    ) -> Result<User> {
        let user = pick_social_identity();
        session.save_user(&user)?;
        log::info!("Signed in as {} ({})", user.name, user.id);

        if let Some(group_id) = group_id {
            self.backend
                .insert_member_request(MemberRequest::pending(group_id, &user))
                .await?;
            log::info!("{} requested to join {}", user.id, group_id);
        }

        Ok(user)
    }

    /// Switch the session to the built-in administrator
    pub fn login_as_admin(&self, session: &SessionStore) -> Result<User> {
        let admin = User::admin();
        session.save_user(&admin)?;
        log::info!("Signed in as administrator");
        Ok(admin)
    }

    pub async fn request_status(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<RequestStatus>> {
        let request = self.backend.find_member_request(group_id, user_id).await?;
        Ok(request.map(|r| r.status))
    }

    pub async fn pending_requests(&self, group_id: &str) -> Result<Vec<MemberRequest>> {
        self.backend
            .member_requests(group_id, RequestStatus::Pending)
            .await
    }

    /// Approve `request` for `group`: mark it approved, set the member count
    /// to `group.member_count + 1` and announce the new member. Stops at the
    /// first failing step.
    pub async fn approve(&self, group: &Group, request: &MemberRequest) -> Result<()> {
        let request_id = request.id.as_deref().ok_or_else(|| {
            ClientError::NotFound(format!("join request of {} has no id", request.user_id))
        })?;

        self.backend
            .update_member_request_status(request_id, RequestStatus::Approved)
            .await?;

        self.backend
            .update_member_count(&group.id, group.member_count + 1)
            .await?;

        let system = User::system();
        let announcement = MessageRow {
            id: ids::system_message_id(),
            group_id: group.id.clone(),
            sender_id: system.id,
            sender_name: system.name,
            sender_avatar: system.avatar,
            text: Some(join_announcement(&request.user_name)),
            images: Vec::new(),
            kind: MessageKind::System,
            created_at: None,
        };
        self.backend.insert_message(announcement).await?;

        log::info!("Approved {} into {}", request.user_id, group.id);
        Ok(())
    }
}
