//! Session lifecycle tests for the store and the chat controller.

use duet_rs_core::{ChatController, MemoryBlobStore, SessionStore};
use duet_rs_test_utils::ScriptedProvider;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        Arc::new(MemoryBlobStore::new()),
        "duet_chat_sessions",
    ))
}

fn controller(store: Arc<SessionStore>) -> ChatController {
    ChatController::builder(
        store,
        Arc::new(ScriptedProvider::cloud(&["reply"])),
        Arc::new(ScriptedProvider::local(&["reply"])),
    )
    .build()
}

#[test]
fn created_session_is_listed_first() {
    let store = store();
    let created = store.create_session().expect("create");
    let sessions = store.list_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, created.id);
    assert_eq!(sessions[0].title, "New Chat");
    assert_eq!(sessions[0].created_at, sessions[0].updated_at);
}

#[tokio::test]
async fn start_activates_the_most_recent_session() {
    let store = store();
    let older = store.create_session().expect("create");
    let mut newer = store.create_session().expect("create");
    newer.updated_at = older.updated_at + 10;
    store.save_session(&newer).expect("save");

    let controller = controller(store);
    controller.start().await;
    assert_eq!(controller.active_session_id(), Some(newer.id));
    assert_eq!(controller.sessions().len(), 2);
}

/// Deleting the active session activates the most recently updated remaining one.
#[tokio::test]
async fn deleting_active_session_activates_most_recent_remaining() {
    let store = store();
    let controller = controller(store.clone());
    controller.start().await;
    let first = controller.active_session_id().expect("active");

    let second = controller.new_chat();
    let third = controller.new_chat();
    controller.select_session(second).expect("select");
    controller.delete_session(second);

    let remaining: Vec<_> = store.list_sessions().iter().map(|s| s.id).collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&first));
    assert!(!remaining.contains(&second));
    assert_eq!(controller.active_session_id(), Some(third));
}

#[tokio::test]
async fn deleting_last_session_activates_a_fresh_one() {
    let store = store();
    let controller = controller(store.clone());
    controller.start().await;
    let only = controller.active_session_id().expect("active");
    controller.delete_session(only);

    let active = controller.active_session().expect("fresh session");
    assert_ne!(active.id, only);
    assert!(active.messages.is_empty());
    assert_eq!(active.title, "New Chat");
    assert_eq!(store.list_sessions().len(), 1);
}

#[tokio::test]
async fn deleting_inactive_session_keeps_selection() {
    let store = store();
    let controller = controller(store.clone());
    controller.start().await;
    let original = controller.active_session_id().expect("active");
    let extra = controller.new_chat();
    controller.select_session(original).expect("select");
    controller.delete_session(extra);
    assert_eq!(controller.active_session_id(), Some(original));
}

#[tokio::test]
async fn turns_go_to_the_selected_session() {
    let store = store();
    let controller = controller(store.clone());
    controller.start().await;
    let original = controller.active_session_id().expect("active");
    let other = controller.new_chat();
    controller.select_session(original).expect("select");
    controller.send_message("hello original").await;

    let original_messages = store.get_session(original).expect("stored").messages;
    let other_messages = store.get_session(other).expect("stored").messages;
    assert_eq!(original_messages.len(), 2);
    assert!(other_messages.is_empty());
    assert_eq!(controller.sessions()[0].id, original);
}
