//! Application state and screen navigation.
//!
//! `App` owns everything the user sees: the current screen, the group
//! directory, the active room's message list, the session identity and the
//! admin's list of pending join requests. It is driven from one loop: user
//! actions are method calls, and background work (sends in flight, the
//! realtime feed) reports back as `AppEvent`s that the loop feeds to
//! [`App::handle_event`]. State is therefore only ever mutated by the loop.
//!
//! Backend failures are logged and otherwise swallowed: a failed group fetch
//! keeps the previous list, a failed send disappears from the room, a failed
//! approval does nothing.
//!
//! ```text
//! GroupList --create (admin)--> CreateGroup --submit/back--> GroupList
//! GroupList --open, approved or admin--> Chat
//! GroupList --open, otherwise--> Welcome --join--> Welcome (waiting)
//!                                Welcome --admin login/back--> GroupList
//! Chat --info--> Info --back--> Chat
//! Chat --back--> GroupList
//! ```

use crate::backend::{Backend, ChangeEvent};
use crate::directory::{GroupDirectory, GroupDraft};
use crate::error::Result;
use crate::membership::{is_group_admin, MembershipFlow};
use crate::models::{Group, MemberRequest, Message, RequestStatus, User};
use crate::session::SessionStore;
use crate::sync::{MessageLog, MessageSync, OutgoingMessage, SendOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    GroupList,
    CreateGroup,
    Welcome,
    Chat,
    Info,
    /// Reserved; nothing navigates here yet
    ProfileEdit,
}

/// Results of background work, delivered to the loop
#[derive(Debug)]
pub enum AppEvent {
    Remote { group_id: String, change: ChangeEvent },
    SendSettled(SendOutcome),
    SubscriptionClosed { group_id: String },
}

pub struct App<B: Backend> {
    session: SessionStore,
    directory: GroupDirectory<B>,
    membership: MembershipFlow<B>,
    sync: MessageSync<B>,
    backend: Arc<B>,

    screen: Screen,
    groups: Vec<Group>,
    active_group_id: Option<String>,
    messages: MessageLog,
    user: User,
    waiting_approval: bool,
    pending_requests: Vec<MemberRequest>,

    subscription: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
}

impl<B: Backend> App<B> {
    /// Build the app on top of `backend`. The identity comes from the
    /// session, creating a guest on first use.
    pub fn new(backend: Arc<B>, session: SessionStore, history_limit: usize) -> Result<Self> {
        let user = session.load_or_create_guest()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(App {
            session,
            directory: GroupDirectory::new(Arc::clone(&backend)),
            membership: MembershipFlow::new(Arc::clone(&backend)),
            sync: MessageSync::new(Arc::clone(&backend), history_limit),
            backend,
            screen: Screen::GroupList,
            groups: Vec::new(),
            active_group_id: None,
            messages: MessageLog::new(),
            user,
            waiting_approval: false,
            pending_requests: Vec::new(),
            subscription: None,
            events_tx,
            events_rx: Some(events_rx),
        })
    }

    /// Initial load of the directory
    pub async fn start(&mut self) {
        log::info!("Starting as {} ({})", self.user.name, self.user.id);
        self.refresh_groups().await;
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.messages()
    }

    pub fn pending_requests(&self) -> &[MemberRequest] {
        &self.pending_requests
    }

    pub fn is_waiting_approval(&self) -> bool {
        self.waiting_approval
    }

    pub fn active_group_id(&self) -> Option<&str> {
        self.active_group_id.as_deref()
    }

    /// The active group, or the placeholder when it is not in the directory
    pub fn active_group(&self) -> Group {
        self.active_group_id
            .as_deref()
            .and_then(|id| self.groups.iter().find(|g| g.id == id))
            .cloned()
            .unwrap_or_else(Group::placeholder)
    }

    pub fn is_current_user_admin(&self) -> bool {
        is_group_admin(&self.user, &self.active_group())
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Hand the event receiver to an outer loop. After this,
    /// [`App::next_event`] returns `None`.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<AppEvent>> {
        self.events_rx.take()
    }

    /// Wait for the next background event
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        match self.events_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// A background event that is already queued, without waiting
    pub fn try_next_event(&mut self) -> Option<AppEvent> {
        self.events_rx.as_mut()?.try_recv().ok()
    }

    pub async fn refresh_groups(&mut self) {
        match self.directory.fetch_groups().await {
            Ok(groups) => {
                log::debug!("Directory holds {} groups", groups.len());
                self.groups = groups;
            }
            Err(e) => log::error!("Failed to fetch groups: {}", e),
        }
    }

    async fn refresh_pending_requests(&mut self) {
        let Some(group_id) = self.active_group_id.clone() else {
            return;
        };
        match self.membership.pending_requests(&group_id).await {
            Ok(requests) => self.pending_requests = requests,
            Err(e) => log::error!("Failed to fetch join requests for {}: {}", group_id, e),
        }
    }

    async fn reload_history(&mut self) {
        let Some(group_id) = self.active_group_id.clone() else {
            return;
        };
        match self.sync.load_history(&group_id).await {
            Ok(rows) => self.messages.replace_history(rows, &self.user.id),
            Err(e) => log::error!("Failed to load messages for {}: {}", group_id, e),
        }
    }

    /// Make `group_id` the active room: drop the previous feed, load history
    /// and subscribe to the new group's changes
    async fn activate_group(&mut self, group_id: &str) {
        if self.active_group_id.as_deref() == Some(group_id) && self.subscription.is_some() {
            return;
        }

        self.close_subscription();
        self.active_group_id = Some(group_id.to_string());
        self.messages.clear();
        self.pending_requests.clear();

        self.reload_history().await;

        match self.backend.subscribe(group_id).await {
            Ok(mut subscription) => {
                let tx = self.events_tx.clone();
                let group_id = group_id.to_string();
                self.subscription = Some(tokio::spawn(async move {
                    while let Some(change) = subscription.next().await {
                        let event = AppEvent::Remote {
                            group_id: group_id.clone(),
                            change,
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(AppEvent::SubscriptionClosed { group_id });
                }));
            }
            Err(e) => log::error!("Failed to subscribe to {}: {}", group_id, e),
        }
    }

    fn close_subscription(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
    }

    /// Tap on a group in the directory. Goes to the room when the user is
    /// approved or administers the group, otherwise to the welcome screen.
    pub async fn open_group(&mut self, group_id: &str) {
        self.activate_group(group_id).await;
        // Groups created since the last refresh are picked up here.
        self.resolve_active_group().await;

        let status = match self.membership.request_status(group_id, &self.user.id).await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Join request lookup for {} failed: {}", group_id, e);
                None
            }
        };

        let is_admin = is_group_admin(&self.user, &self.active_group());
        self.waiting_approval = status == Some(RequestStatus::Pending);
        self.screen = if status == Some(RequestStatus::Approved) || is_admin {
            Screen::Chat
        } else {
            Screen::Welcome
        };
        log::debug!("Opened {} on {:?}", group_id, self.screen);
    }

    /// The directory's "new group" button, shown to admins only
    pub fn begin_create_group(&mut self) -> bool {
        if self.screen != Screen::GroupList || !self.user.is_admin() {
            return false;
        }
        self.screen = Screen::CreateGroup;
        true
    }

    /// Submit the create-group form. Nothing happens for a blank name.
    pub async fn submit_group(&mut self, draft: GroupDraft) -> bool {
        if self.screen != Screen::CreateGroup || !draft.is_submittable() {
            return false;
        }

        if let Err(e) = self.directory.create_group(&self.user, draft).await {
            log::error!("Failed to create group: {}", e);
        }
        self.refresh_groups().await;
        self.screen = Screen::GroupList;
        true
    }

    /// Mock social login from the welcome screen
    pub async fn join_with_social(&mut self) {
        let group_id = self.active_group_id.clone();
        match self
            .membership
            .join_with_social(&self.session, group_id.as_deref())
            .await
        {
            Ok(user) => {
                self.user = user;
                if group_id.is_some() {
                    self.waiting_approval = true;
                }
                self.reload_history().await;
            }
            Err(e) => log::error!("Failed to join: {}", e),
        }
    }

    pub async fn login_as_admin(&mut self) {
        match self.membership.login_as_admin(&self.session) {
            Ok(admin) => {
                self.user = admin;
                self.screen = Screen::GroupList;
                self.reload_history().await;
            }
            Err(e) => log::error!("Failed to switch to administrator: {}", e),
        }
    }

    /// Open the group info panel. Admins also get the pending requests.
    pub async fn show_info(&mut self) {
        if self.screen != Screen::Chat {
            return;
        }
        self.screen = Screen::Info;
        if self.is_current_user_admin() {
            self.refresh_pending_requests().await;
        }
    }

    pub fn back(&mut self) {
        self.screen = match self.screen {
            Screen::Info => Screen::Chat,
            Screen::GroupList
            | Screen::CreateGroup
            | Screen::Welcome
            | Screen::Chat
            | Screen::ProfileEdit => Screen::GroupList,
        };
    }

    /// Send to the active room. Returns the id of the optimistic entry, or
    /// `None` when there was nothing to send or no room is open.
    pub fn send_message(&mut self, text: &str, images: Vec<String>) -> Option<String> {
        let group_id = self.active_group_id.clone()?;
        let outgoing = OutgoingMessage::new(text, images)?;

        let tx = self.events_tx.clone();
        let id = self.sync.send(
            &mut self.messages,
            &group_id,
            &self.user,
            outgoing,
            move |outcome| {
                let _ = tx.send(AppEvent::SendSettled(outcome));
            },
        );
        Some(id)
    }

    /// The active group as the directory knows it. Refreshes once when the
    /// group is missing from the cached list; never the placeholder.
    async fn resolve_active_group(&mut self) -> Option<Group> {
        let group_id = self.active_group_id.clone()?;
        let cached = |groups: &[Group]| groups.iter().find(|g| g.id == group_id).cloned();

        if let Some(group) = cached(&self.groups) {
            return Some(group);
        }
        self.refresh_groups().await;
        cached(&self.groups)
    }

    /// Approve a join request for the active group. Failures are logged only.
    pub async fn approve(&mut self, request: &MemberRequest) {
        let Some(group) = self.resolve_active_group().await else {
            log::warn!(
                "Cannot approve {}: group {} is not in the directory",
                request.user_id,
                self.active_group_id.as_deref().unwrap_or("<none>")
            );
            return;
        };
        if request.group_id != group.id {
            log::warn!(
                "Join request of {} belongs to {}, not {}",
                request.user_id,
                request.group_id,
                group.id
            );
            return;
        }
        if !is_group_admin(&self.user, &group) {
            log::warn!("{} may not approve requests for {}", self.user.id, group.id);
            return;
        }

        if let Err(e) = self.membership.approve(&group, request).await {
            log::error!("Failed to approve {}: {}", request.user_id, e);
            return;
        }

        self.refresh_groups().await;
        self.refresh_pending_requests().await;
    }

    /// Apply one background event. Returns whether anything visible changed.
    pub async fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::SendSettled(outcome) => {
                if self.active_group_id.as_deref() != Some(outcome.group_id.as_str()) {
                    return false;
                }
                self.messages.settle(&outcome)
            }
            AppEvent::Remote { group_id, change } => {
                if self.active_group_id.as_deref() != Some(group_id.as_str()) {
                    log::debug!("Dropping change for inactive group {}", group_id);
                    return false;
                }
                match change {
                    ChangeEvent::MessageInserted(row) => {
                        self.messages.apply_remote(row, &self.user.id)
                    }
                    ChangeEvent::MemberRequestChanged(request) => {
                        log::debug!(
                            "Join request of {} is now {}",
                            request.user_id,
                            request.status
                        );
                        self.refresh_groups().await;
                        if self.is_current_user_admin() {
                            self.refresh_pending_requests().await;
                        }
                        true
                    }
                }
            }
            AppEvent::SubscriptionClosed { group_id } => {
                log::warn!("Realtime feed for {} ended", group_id);
                if self.active_group_id.as_deref() == Some(group_id.as_str()) {
                    self.subscription = None;
                }
                false
            }
        }
    }

    /// Stop background work
    pub fn shutdown(&mut self) {
        self.close_subscription();
    }
}

impl<B: Backend> Drop for App<B> {
    fn drop(&mut self) {
        self.close_subscription();
    }
}
