//! Note pool and realtime socket tests

mod helpers;

use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use helpers::{test_app, test_app_with};
use notehub_common::models::Permission;
use notehub_common::note_id::encode_note_id;
use notehub_common::ot::TextOperation;
use notehub_server::db::{notes, revisions};
use notehub_server::realtime::{ClientSession, NewClient, NotePool, PoolError, PoolEvent};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::{self, Message};
use uuid::Uuid;

fn editor(name: &str) -> NewClient {
    NewClient {
        user_id: None,
        name: name.to_string(),
        can_edit: true,
    }
}

fn op(build: impl FnOnce(&mut TextOperation)) -> TextOperation {
    let mut operation = TextOperation::new();
    build(&mut operation);
    operation
}

async fn join(pool: &NotePool, note_id: Uuid, client: NewClient) -> ClientSession {
    pool.join(note_id, client).await.unwrap()
}

#[tokio::test]
async fn test_join_loads_note_snapshot() {
    let app = test_app().await;
    let note = app.note(None, "hello", Permission::Freely).await;

    let first = join(&app.state.pool, note.id, editor("first")).await;
    assert_eq!(first.snapshot.content, "hello");
    assert_eq!(first.snapshot.revision, 0);
    assert_eq!(first.snapshot.users.len(), 1);
    assert!(app.state.pool.is_note_in_pool(note.id));

    let second = join(&app.state.pool, note.id, editor("second")).await;
    let names: Vec<&str> = second.snapshot.users.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"first"));
    assert!(names.contains(&"second"));
    assert_eq!(app.state.pool.live_count(), 1);
}

#[tokio::test]
async fn test_join_missing_note() {
    let app = test_app().await;
    let result = app.state.pool.join(Uuid::new_v4(), editor("ghost")).await;
    assert!(matches!(result, Err(PoolError::NotFound)));
    assert_eq!(app.state.pool.live_count(), 0);
}

#[tokio::test]
async fn test_concurrent_operations_are_transformed() {
    let app = test_app().await;
    let note = app.note(None, "abc", Permission::Freely).await;
    let pool = &app.state.pool;
    let a = join(pool, note.id, editor("a")).await;
    let b = join(pool, note.id, editor("b")).await;

    // Both edits are made against revision 0
    let rev = pool
        .apply_operation(note.id, a.client_id, 0, op(|o| { o.insert("X").retain(3); }))
        .await
        .unwrap();
    assert_eq!(rev, 1);
    let rev = pool
        .apply_operation(note.id, b.client_id, 0, op(|o| { o.retain(3).insert("Y"); }))
        .await
        .unwrap();
    assert_eq!(rev, 2);

    let snapshot = pool.snapshot(note.id).await.unwrap();
    assert_eq!(snapshot.content, "XabcY");
    assert_eq!(snapshot.revision, 2);
}

#[tokio::test]
async fn test_operations_broadcast_in_revision_order() {
    let app = test_app().await;
    let note = app.note(None, "", Permission::Freely).await;
    let pool = &app.state.pool;
    let writer = join(pool, note.id, editor("writer")).await;
    let mut watcher = join(pool, note.id, editor("watcher")).await;

    pool.apply_operation(note.id, writer.client_id, 0, op(|o| { o.insert("a"); }))
        .await
        .unwrap();
    pool.apply_operation(note.id, writer.client_id, 1, op(|o| { o.retain(1).insert("b"); }))
        .await
        .unwrap();

    let mut revisions = Vec::new();
    while revisions.len() < 2 {
        match watcher.events.recv().await.unwrap() {
            PoolEvent::Operation { origin, revision, .. } => {
                assert_eq!(origin, writer.client_id);
                revisions.push(revision);
            }
            _ => continue,
        }
    }
    assert_eq!(revisions, vec![1, 2]);
}

#[tokio::test]
async fn test_revision_bounds_checked() {
    let app = test_app().await;
    let note = app.note(None, "abc", Permission::Freely).await;
    let pool = &app.state.pool;
    let client = join(pool, note.id, editor("c")).await;

    let ahead = pool
        .apply_operation(note.id, client.client_id, 5, op(|o| { o.retain(3); }))
        .await;
    assert!(matches!(ahead, Err(PoolError::FutureRevision { revision: 5, current: 0 })));

    let wrong_length = pool
        .apply_operation(note.id, client.client_id, 0, op(|o| { o.retain(10); }))
        .await;
    assert!(matches!(wrong_length, Err(PoolError::Operation(_))));

    // Rejected operations leave the document untouched
    let snapshot = pool.snapshot(note.id).await.unwrap();
    assert_eq!(snapshot.content, "abc");
    assert_eq!(snapshot.revision, 0);
}

#[tokio::test]
async fn test_stale_revision_after_history_trim() {
    let app = test_app().await;
    let note = app.note(None, "", Permission::Freely).await;
    let pool = &app.state.pool;
    let client = join(pool, note.id, editor("typist")).await;

    for rev in 0..501u64 {
        let len = rev as usize;
        pool.apply_operation(note.id, client.client_id, rev, op(|o| { o.retain(len).insert("x"); }))
            .await
            .unwrap();
    }

    let stale = pool
        .apply_operation(note.id, client.client_id, 0, op(|o| { o.insert("y"); }))
        .await;
    assert!(matches!(stale, Err(PoolError::StaleRevision { revision: 0, oldest: 1 })));
}

#[tokio::test]
async fn test_read_only_client_rejected() {
    let app = test_app().await;
    let note = app.note(None, "abc", Permission::Freely).await;
    let pool = &app.state.pool;
    let viewer = join(
        pool,
        note.id,
        NewClient {
            user_id: None,
            name: "viewer".to_string(),
            can_edit: false,
        },
    )
    .await;

    let result = pool
        .apply_operation(note.id, viewer.client_id, 0, op(|o| { o.retain(3).insert("!"); }))
        .await;
    assert!(matches!(result, Err(PoolError::ReadOnly)));
}

#[tokio::test]
async fn test_last_leaver_saves_note_and_revision() {
    let app = test_app().await;
    let (user_id, _) = app.register("writer").await;
    let note = app.note(Some(user_id), "# Title", Permission::Editable).await;
    let pool = &app.state.pool;
    let client = join(
        pool,
        note.id,
        NewClient {
            user_id: Some(user_id),
            name: "writer".to_string(),
            can_edit: true,
        },
    )
    .await;

    pool.apply_operation(note.id, client.client_id, 0, op(|o| { o.retain(7).insert("\nbody"); }))
        .await
        .unwrap();
    pool.leave(note.id, client.client_id).await;
    assert!(!pool.is_note_in_pool(note.id));

    let stored = notes::get_note(&app.state.db, note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "# Title\nbody");
    assert_eq!(stored.last_change_user_id, Some(user_id));
    assert!(stored.last_change_at.is_some());

    let history = revisions::list_revisions(&app.state.db, note.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].length, 12);

    // A new session sees the saved content
    let again = join(pool, note.id, editor("reader")).await;
    assert_eq!(again.snapshot.content, "# Title\nbody");
}

#[tokio::test]
async fn test_flush_dirty_saves_without_closing() {
    let app = test_app().await;
    let note = app.note(None, "one", Permission::Freely).await;
    let pool = &app.state.pool;
    let client = join(pool, note.id, editor("e")).await;

    pool.apply_operation(note.id, client.client_id, 0, op(|o| { o.retain(3).insert(" two"); }))
        .await
        .unwrap();
    assert_eq!(pool.flush_dirty().await, 1);
    assert_eq!(pool.flush_dirty().await, 0);
    assert!(pool.is_note_in_pool(note.id));

    let stored = notes::get_note(&app.state.db, note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "one two");
}

#[tokio::test]
async fn test_http_lock_and_live_session_exclude_each_other() {
    let app = test_app().await;
    let note = app.note(None, "abc", Permission::Freely).await;
    let pool = &app.state.pool;

    let guard = pool.lock_for_http_update(note.id).unwrap();
    assert!(pool.lock_for_http_update(note.id).is_none());
    let blocked = pool.join(note.id, editor("late")).await;
    assert!(matches!(blocked, Err(PoolError::Busy)));
    drop(guard);

    let client = join(pool, note.id, editor("now")).await;
    assert!(pool.lock_for_http_update(note.id).is_none());

    pool.leave(note.id, client.client_id).await;
    assert!(pool.lock_for_http_update(note.id).is_some());
}

#[tokio::test]
async fn test_disconnect_note_ends_sessions() {
    let app = test_app().await;
    let note = app.note(None, "abc", Permission::Freely).await;
    let pool = &app.state.pool;
    let mut client = join(pool, note.id, editor("e")).await;

    pool.disconnect_note(note.id).await;
    assert!(client.cancel.is_cancelled());
    assert!(!pool.is_note_in_pool(note.id));

    loop {
        match client.events.recv().await.unwrap() {
            PoolEvent::Deleted => break,
            _ => continue,
        }
    }

    let result = pool
        .apply_operation(note.id, client.client_id, 0, op(|o| { o.retain(3); }))
        .await;
    assert!(matches!(result, Err(PoolError::Closed)));
}

#[tokio::test]
async fn test_client_limit_per_note() {
    let app = test_app_with(|c| c.realtime.max_clients_per_note = 1).await;
    let note = app.note(None, "abc", Permission::Freely).await;

    join(&app.state.pool, note.id, editor("only")).await;
    let second = app.state.pool.join(note.id, editor("extra")).await;
    assert!(matches!(second, Err(PoolError::Full)));
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn spawn_server(router: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_websocket_edit_session() {
    let app = test_app_with(|c| c.allow_anonymous_edits = true).await;
    let note = app.note(None, "hello", Permission::Freely).await;
    let addr = spawn_server(app.router.clone()).await;
    let url = format!("ws://{}/realtime/{}", addr, encode_note_id(&note.id));

    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let doc = next_json(&mut first).await;
    assert_eq!(doc["type"], "doc");
    assert_eq!(doc["content"], "hello");
    assert_eq!(doc["revision"], 0);
    assert_eq!(doc["editable"], true);

    let edit = json!({ "type": "operation", "revision": 0, "operation": [5, " world"] });
    first.send(Message::Text(edit.to_string())).await.unwrap();
    let ack = next_json(&mut first).await;
    assert_eq!(ack, json!({ "type": "ack", "revision": 1 }));

    let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let doc = next_json(&mut second).await;
    assert_eq!(doc["content"], "hello world");
    assert_eq!(doc["revision"], 1);
    assert_eq!(doc["users"].as_array().unwrap().len(), 2);

    let joined = next_json(&mut first).await;
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(joined["user"]["name"], "Guest");

    let edit = json!({ "type": "operation", "revision": 1, "operation": ["!", 11] });
    second.send(Message::Text(edit.to_string())).await.unwrap();
    assert_eq!(next_json(&mut second).await["type"], "ack");
    let remote = next_json(&mut first).await;
    assert_eq!(remote["type"], "operation");
    assert_eq!(remote["revision"], 2);
    assert_eq!(remote["operation"], json!(["!", 11]));

    first.close(None).await.unwrap();
    second.close(None).await.unwrap();

    // Closing the last socket saves the note and releases it
    for _ in 0..100 {
        if !app.state.pool.is_note_in_pool(note.id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!app.state.pool.is_note_in_pool(note.id));
    let stored = notes::get_note(&app.state.db, note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "!hello world");
}

#[tokio::test]
async fn test_websocket_read_only_and_bad_messages() {
    let app = test_app().await;
    let note = app.note(None, "fixed", Permission::Freely).await;
    let addr = spawn_server(app.router.clone()).await;
    let url = format!("ws://{}/realtime/{}", addr, encode_note_id(&note.id));

    // Anonymous edits are off by default
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let doc = next_json(&mut ws).await;
    assert_eq!(doc["editable"], false);

    let edit = json!({ "type": "operation", "revision": 0, "operation": [5, "!"] });
    ws.send(Message::Text(edit.to_string())).await.unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().starts_with("invalid message"));

    ws.send(Message::Text(json!({ "type": "refresh" }).to_string())).await.unwrap();
    let doc = next_json(&mut ws).await;
    assert_eq!(doc["type"], "doc");
    assert_eq!(doc["content"], "fixed");
}

#[tokio::test]
async fn test_websocket_rejects_private_note() {
    let app = test_app().await;
    let (owner, _) = app.register("hidden").await;
    let note = app.note(Some(owner), "secret", Permission::Private).await;
    let addr = spawn_server(app.router.clone()).await;

    let url = format!("ws://{}/realtime/{}", addr, encode_note_id(&note.id));
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());
}

#[tokio::test]
async fn test_deleting_note_closes_sockets() {
    let app = test_app().await;
    let (owner, session) = app.register("deleter").await;
    let note = app.note(Some(owner), "bye", Permission::Freely).await;
    let addr = spawn_server(app.router.clone()).await;
    let url = format!("ws://{}/realtime/{}", addr, encode_note_id(&note.id));

    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "doc");

    let response = app
        .call(
            axum::http::Method::DELETE,
            &format!("/api/notes/{}", encode_note_id(&note.id)),
            Some(&session),
            None,
        )
        .await;
    assert_eq!(response.json()["status"], "ok");

    assert_eq!(next_json(&mut ws).await["type"], "deleted");
}
