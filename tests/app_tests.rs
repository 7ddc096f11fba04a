/// Integration tests for the application state machine
///
/// Every test drives one or more `App`s against a shared in-process backend,
/// the way several devices share the hosted service.

mod common;

use common::{settle, TestContext};
use group_chat_client::backend::{Backend, ChangeEvent};
use group_chat_client::directory::GroupDraft;
use group_chat_client::membership::join_announcement;
use group_chat_client::models::{
    Group, GroupRow, MemberRequest, MessageKind, MessageRow, RequestStatus, User,
};
use group_chat_client::{cli, AppEvent, Screen};

fn community_id() -> String {
    Group::placeholder().id
}

#[tokio::test]
async fn test_empty_directory_shows_no_groups() {
    let ctx = TestContext::empty();
    let app = ctx.app("guest").await.unwrap();

    assert!(app.groups().is_empty());
    assert_eq!(app.screen(), Screen::GroupList);
    assert!(cli::render_screen(&app).contains("No groups yet"));
}

#[tokio::test]
async fn test_guest_identity_survives_restart() {
    let ctx = TestContext::with_demo_data();

    let first = ctx.app("device").await.unwrap().user().clone();
    let second = ctx.app("device").await.unwrap().user().clone();

    assert!(first.id.starts_with("guest_"));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_visitor_lands_on_welcome() {
    let ctx = TestContext::with_demo_data();
    let mut app = ctx.app("guest").await.unwrap();

    app.open_group(&community_id()).await;

    assert_eq!(app.screen(), Screen::Welcome);
    assert!(!app.is_waiting_approval());
    // History is loaded on entry even before the visitor is let in.
    assert_eq!(app.messages().len(), 2);
}

#[tokio::test]
async fn test_admin_goes_straight_to_chat() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();

    admin.open_group(&community_id()).await;
    assert_eq!(admin.screen(), Screen::Chat);
    assert!(admin.is_current_user_admin());
}

#[tokio::test]
async fn test_join_files_pending_request() {
    let ctx = TestContext::with_demo_data();
    let mut app = ctx.app("guest").await.unwrap();

    app.open_group(&community_id()).await;
    app.join_with_social().await;

    assert!(app.user().id.starts_with("fb_"));
    assert!(app.is_waiting_approval());
    assert_eq!(app.screen(), Screen::Welcome);

    let requests = ctx.backend.stored_requests(&community_id());
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_id, app.user().id);
    assert_eq!(requests[0].status, RequestStatus::Pending);

    // The social identity replaces the guest in the session.
    let reopened = ctx.app("guest").await.unwrap();
    assert_eq!(reopened.user(), app.user());
}

#[tokio::test]
async fn test_pending_visitor_sees_waiting_state_after_restart() {
    let ctx = TestContext::with_demo_data();
    {
        let mut app = ctx.app("guest").await.unwrap();
        app.open_group(&community_id()).await;
        app.join_with_social().await;
    }

    let mut app = ctx.app("guest").await.unwrap();
    app.open_group(&community_id()).await;
    assert_eq!(app.screen(), Screen::Welcome);
    assert!(app.is_waiting_approval());
}

#[tokio::test]
async fn test_approval_admits_member_and_announces() {
    let ctx = TestContext::with_demo_data();
    let group_id = community_id();
    let before = ctx.backend.stored_group(&group_id).unwrap().member_count;

    let mut visitor = ctx.app("visitor").await.unwrap();
    visitor.open_group(&group_id).await;
    visitor.join_with_social().await;
    let member = visitor.user().clone();

    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&group_id).await;
    admin.show_info().await;
    assert_eq!(admin.screen(), Screen::Info);
    assert_eq!(admin.pending_requests().len(), 1);

    let request = admin.pending_requests()[0].clone();
    admin.approve(&request).await;

    assert!(admin.pending_requests().is_empty());
    assert_eq!(admin.active_group().member_count, before + 1);
    assert_eq!(
        ctx.backend.stored_group(&group_id).unwrap().member_count,
        before + 1
    );

    let announcement = ctx.backend.stored_messages(&group_id).pop().unwrap();
    assert_eq!(announcement.kind, MessageKind::System);
    assert_eq!(announcement.text, Some(join_announcement(&member.name)));

    // The admin's room receives the announcement over the realtime feed.
    settle(&mut admin).await;
    let last = admin.messages().last().unwrap();
    assert!(last.is_system());

    // Reopening the group now leads the new member into the room.
    visitor.back();
    visitor.open_group(&group_id).await;
    assert_eq!(visitor.screen(), Screen::Chat);
    assert!(!visitor.is_waiting_approval());
}

#[tokio::test]
async fn test_approving_twice_counts_twice() {
    let ctx = TestContext::with_demo_data();
    let group_id = community_id();
    let before = ctx.backend.stored_group(&group_id).unwrap().member_count;

    let mut visitor = ctx.app("visitor").await.unwrap();
    visitor.open_group(&group_id).await;
    visitor.join_with_social().await;

    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&group_id).await;
    admin.show_info().await;
    let request = admin.pending_requests()[0].clone();

    admin.approve(&request).await;
    admin.approve(&request).await;

    assert_eq!(
        ctx.backend.stored_group(&group_id).unwrap().member_count,
        before + 2
    );
    let announcements = ctx
        .backend
        .stored_messages(&group_id)
        .into_iter()
        .filter(|m| m.kind == MessageKind::System && m.sender_id == User::SYSTEM_ID)
        .count();
    // One seeded system message plus one per approval.
    assert_eq!(announcements, 3);
}

#[tokio::test]
async fn test_non_admin_cannot_approve() {
    let ctx = TestContext::with_demo_data();
    let group_id = community_id();
    let before = ctx.backend.stored_group(&group_id).unwrap().member_count;

    let mut visitor = ctx.app("visitor").await.unwrap();
    visitor.open_group(&group_id).await;
    visitor.join_with_social().await;
    let request = ctx.backend.stored_requests(&group_id).remove(0);

    visitor.approve(&request).await;

    assert_eq!(
        ctx.backend.stored_group(&group_id).unwrap().member_count,
        before
    );
    assert_eq!(
        ctx.backend.stored_requests(&group_id)[0].status,
        RequestStatus::Pending
    );
}

#[tokio::test]
async fn test_blank_message_sends_nothing() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&community_id()).await;
    let stored = ctx.backend.stored_messages(&community_id()).len();

    assert!(admin.send_message("   ", Vec::new()).is_none());
    settle(&mut admin).await;

    assert_eq!(admin.messages().len(), 2);
    assert_eq!(ctx.backend.stored_messages(&community_id()).len(), stored);
}

#[tokio::test]
async fn test_sent_message_appears_once() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&community_id()).await;

    let id = admin.send_message("  Welcome, everyone!  ", Vec::new()).unwrap();

    // Visible immediately, before the backend answers.
    let optimistic = admin.messages().last().unwrap();
    assert_eq!(optimistic.id, id);
    assert!(optimistic.is_me);
    assert_eq!(optimistic.text.as_deref(), Some("Welcome, everyone!"));

    // The insert settles and the realtime echo arrives; neither duplicates it.
    assert!(settle(&mut admin).await >= 2);
    assert_eq!(admin.messages().iter().filter(|m| m.id == id).count(), 1);
    assert_eq!(admin.messages().len(), 3);

    let stored = ctx.backend.stored_messages(&community_id()).pop().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.sender_id, User::ADMIN_ID);
}

#[tokio::test]
async fn test_failed_send_is_rolled_back() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&community_id()).await;

    ctx.backend.reject_messages(true);
    let id = admin.send_message("lost", Vec::new()).unwrap();
    assert!(admin.messages().iter().any(|m| m.id == id));

    settle(&mut admin).await;

    assert!(admin.messages().iter().all(|m| m.id != id));
    assert_eq!(admin.messages().len(), 2);
    assert_eq!(ctx.backend.stored_messages(&community_id()).len(), 2);
}

#[tokio::test]
async fn test_image_only_message() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&community_id()).await;

    let image = "data:image/png;base64,iVBORw==".to_string();
    let id = admin.send_message("", vec![image.clone()]).unwrap();
    settle(&mut admin).await;

    let stored = ctx.backend.stored_messages(&community_id()).pop().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.text, None);
    assert_eq!(stored.images, vec![image]);
}

#[tokio::test]
async fn test_messages_from_others_arrive_live() {
    let ctx = TestContext::with_demo_data();
    let group_id = community_id();
    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&group_id).await;

    ctx.backend
        .insert_message(MessageRow {
            id: "remote-1".to_string(),
            group_id: group_id.clone(),
            sender_id: "u1".to_string(),
            sender_name: "Minh Thư".to_string(),
            sender_avatar: String::new(),
            text: Some("Good morning!".to_string()),
            images: Vec::new(),
            kind: MessageKind::Chat,
            created_at: None,
        })
        .await
        .unwrap();

    settle(&mut admin).await;
    let last = admin.messages().last().unwrap();
    assert_eq!(last.id, "remote-1");
    assert!(!last.is_me);
    assert_eq!(last.sender.name, "Minh Thư");
}

#[tokio::test]
async fn test_events_for_other_groups_are_ignored() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&community_id()).await;

    let changed = admin
        .handle_event(AppEvent::Remote {
            group_id: "group_other".to_string(),
            change: ChangeEvent::MessageInserted(MessageRow {
                id: "elsewhere".to_string(),
                group_id: "group_other".to_string(),
                sender_id: "u1".to_string(),
                sender_name: String::new(),
                sender_avatar: String::new(),
                text: Some("hi".to_string()),
                images: Vec::new(),
                kind: MessageKind::Chat,
                created_at: None,
            }),
        })
        .await;

    assert!(!changed);
    assert!(admin.messages().iter().all(|m| m.id != "elsewhere"));
}

#[tokio::test]
async fn test_switching_groups_replaces_history() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();

    admin.begin_create_group();
    admin
        .submit_group(GroupDraft::new("Runners", "Morning runs"))
        .await;
    let runners = admin
        .groups()
        .iter()
        .find(|g| g.name == "Runners")
        .unwrap()
        .id
        .clone();

    admin.open_group(&community_id()).await;
    assert_eq!(admin.messages().len(), 2);

    admin.back();
    admin.open_group(&runners).await;
    assert_eq!(admin.active_group_id(), Some(runners.as_str()));
    assert!(admin.messages().is_empty());
    assert_eq!(admin.screen(), Screen::Chat);
}

#[tokio::test]
async fn test_admin_creates_group() {
    let ctx = TestContext::empty();
    let mut admin = ctx.admin_app("admin").await.unwrap();

    assert!(admin.begin_create_group());
    assert!(!admin.submit_group(GroupDraft::new("   ", "no name")).await);
    assert_eq!(admin.screen(), Screen::CreateGroup);

    assert!(admin.submit_group(GroupDraft::new("Cooks", "Recipes")).await);
    assert_eq!(admin.screen(), Screen::GroupList);
    assert_eq!(admin.groups().len(), 1);

    let group = &admin.groups()[0];
    assert_eq!(group.name, "Cooks");
    assert_eq!(group.member_count, 1);
    assert_eq!(group.admin_id, User::ADMIN_ID);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_groups() {
    let ctx = TestContext::with_demo_data();
    let mut app = ctx.app("guest").await.unwrap();
    assert_eq!(app.groups().len(), 1);

    ctx.backend.set_offline(true);
    app.refresh_groups().await;
    assert_eq!(app.groups().len(), 1);
}

#[tokio::test]
async fn test_info_hides_requests_from_members() {
    let ctx = TestContext::with_demo_data();
    let group_id = community_id();

    let mut visitor = ctx.app("visitor").await.unwrap();
    visitor.open_group(&group_id).await;
    visitor.join_with_social().await;

    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group(&group_id).await;
    admin.show_info().await;
    let request = admin.pending_requests()[0].clone();
    admin.approve(&request).await;

    visitor.back();
    visitor.open_group(&group_id).await;
    visitor.show_info().await;

    assert_eq!(visitor.screen(), Screen::Info);
    assert!(visitor.pending_requests().is_empty());
    assert!(!cli::render_screen(&visitor).contains("Join requests"));

    visitor.back();
    assert_eq!(visitor.screen(), Screen::Chat);
}

fn system_messages(ctx: &TestContext, group_id: &str) -> usize {
    ctx.backend
        .stored_messages(group_id)
        .into_iter()
        .filter(|m| m.kind == MessageKind::System)
        .count()
}

#[tokio::test]
async fn test_approval_in_group_created_after_start() {
    let ctx = TestContext::with_demo_data();
    let mut admin = ctx.admin_app("admin").await.unwrap();

    // Created by another device after this app loaded the directory.
    ctx.backend
        .insert_group(GroupRow {
            id: "group_late".to_string(),
            name: "Late".to_string(),
            avatar: String::new(),
            description: String::new(),
            member_count: 5,
            admin_id: User::ADMIN_ID.to_string(),
            rules: Vec::new(),
            pending_member_ids: None,
            created_at: None,
        })
        .await
        .unwrap();
    let community_before = ctx.backend.stored_group(&community_id()).unwrap().member_count;
    let community_system = system_messages(&ctx, &community_id());

    let mut visitor = ctx.app("visitor").await.unwrap();
    visitor.open_group("group_late").await;
    visitor.join_with_social().await;

    admin.open_group("group_late").await;
    admin.show_info().await;
    let request = admin.pending_requests()[0].clone();
    admin.approve(&request).await;

    assert_eq!(ctx.backend.stored_group("group_late").unwrap().member_count, 6);
    assert_eq!(system_messages(&ctx, "group_late"), 1);
    assert_eq!(
        ctx.backend.stored_group(&community_id()).unwrap().member_count,
        community_before
    );
    assert_eq!(system_messages(&ctx, &community_id()), community_system);
}

#[tokio::test]
async fn test_approval_refused_for_group_missing_from_directory() {
    let ctx = TestContext::with_demo_data();
    let visitor = User::new("fb_ghost", "An", "");
    ctx.backend
        .insert_member_request(MemberRequest::pending("group_gone", &visitor))
        .await
        .unwrap();
    let community_before = ctx.backend.stored_group(&community_id()).unwrap().member_count;
    let community_system = system_messages(&ctx, &community_id());

    let mut admin = ctx.admin_app("admin").await.unwrap();
    admin.open_group("group_gone").await;
    admin.show_info().await;
    assert_eq!(admin.pending_requests().len(), 1);

    let request = admin.pending_requests()[0].clone();
    admin.approve(&request).await;

    assert_eq!(
        ctx.backend.stored_requests("group_gone")[0].status,
        RequestStatus::Pending
    );
    assert_eq!(system_messages(&ctx, "group_gone"), 0);
    assert_eq!(
        ctx.backend.stored_group(&community_id()).unwrap().member_count,
        community_before
    );
    assert_eq!(system_messages(&ctx, &community_id()), community_system);
}
