//! Tag and alias store behavior under deletes and concurrent writers

mod helpers;

use axum::http::{Method, StatusCode};
use helpers::test_app;
use notehub_common::models::Permission;
use notehub_common::note_id::encode_note_id;
use notehub_server::db::notes::{self, NewNote};
use notehub_server::db::tags::{self, DeleteOutcome, NoteTagOutcome, TagChange};
use serde_json::json;

#[tokio::test]
async fn test_deleted_tag_cannot_be_attached() {
    let app = test_app().await;
    let (user_id, session) = app.register("lena").await;
    let note = app.note(Some(user_id), "# Orphan", Permission::Private).await;
    let tag_id = app.tag(&session, "gone").await;

    let deleted = app
        .call(Method::DELETE, &format!("/api/tag/{}", tag_id), Some(&session), None)
        .await;
    assert_eq!(deleted.json()["status"], "ok");

    let outcome = tags::update_note_tag(&app.state.db, user_id, note.id, tag_id, TagChange::Add)
        .await
        .unwrap();
    assert_eq!(outcome, NoteTagOutcome::TagNotFound);
    assert_eq!(app.tag_count(tag_id).await, 0);
    assert_eq!(app.tag_references(tag_id).await, 0);

    let uri = format!("/api/notes/{}/add_tag", encode_note_id(&note.id));
    let response = app
        .call(Method::POST, &uri, Some(&session), Some(json!({ "tagId": tag_id })))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.tag_references(tag_id).await, 0);
}

#[tokio::test]
async fn test_tag_changes_racing_delete_stay_consistent() {
    let app = test_app().await;
    let (user_id, session) = app.register("milo").await;
    let tag_id = app.tag(&session, "contested").await;

    let mut note_ids = Vec::new();
    for i in 0..6 {
        let note = app
            .note(Some(user_id), &format!("# Note {}", i), Permission::Private)
            .await;
        note_ids.push(note.id);
    }

    let mut adds = Vec::new();
    for note_id in note_ids {
        let db = app.state.db.clone();
        adds.push(tokio::spawn(async move {
            tags::update_note_tag(&db, user_id, note_id, tag_id, TagChange::Add).await
        }));
    }
    let db = app.state.db.clone();
    let delete = tokio::spawn(async move { tags::delete_tag(&db, user_id, tag_id).await });

    for add in adds {
        // Lock timeouts are acceptable here; only committed state is checked
        let _ = add.await.unwrap();
    }
    let deleted = delete.await.unwrap();

    let count = app.tag_count(tag_id).await;
    let references = app.tag_references(tag_id).await;
    assert_eq!(count, references);
    if matches!(deleted, Ok(DeleteOutcome::Deleted)) {
        assert_eq!(references, 0);
    }
}

#[tokio::test]
async fn test_add_tag_accepts_snake_case_body() {
    let app = test_app().await;
    let (user_id, session) = app.register("nora").await;
    let note = app.note(Some(user_id), "# Snake", Permission::Private).await;
    let tag_id = app.tag(&session, "snake").await;

    let uri = format!("/api/notes/{}/add_tag", encode_note_id(&note.id));
    let response = app
        .call(Method::POST, &uri, Some(&session), Some(json!({ "tag_id": tag_id })))
        .await;
    assert_eq!(response.json()["status"], "ok", "{}", response.text());
    assert_eq!(app.tag_count(tag_id).await, 1);
}

#[tokio::test]
async fn test_concurrent_tag_creation_returns_one_tag() {
    let app = test_app().await;
    let (user_id, _) = app.register("otto").await;

    let first_db = app.state.db.clone();
    let second_db = app.state.db.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { tags::find_or_create_tag(&first_db, user_id, "twin").await }),
        tokio::spawn(async move { tags::find_or_create_tag(&second_db, user_id, "twin").await }),
    );
    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();
    assert_eq!(first.id, second.id);

    let listed = tags::list_tags(&app.state.db, user_id, None).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_taken_alias_returns_existing_note() {
    let app = test_app().await;

    let aliased = |content: &str| NewNote {
        owner_id: None,
        alias: Some("meeting-notes".to_string()),
        content: content.to_string(),
        permission: Permission::Freely,
    };
    let first = notes::create_aliased_note(&app.state.db, aliased("# First")).await.unwrap();
    let second = notes::create_aliased_note(&app.state.db, aliased("# Second")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.content, "# First");
}

#[tokio::test]
async fn test_update_rejected_while_another_update_holds_note() {
    let app = test_app().await;
    let (user_id, session) = app.register("pia").await;
    let note = app.note(Some(user_id), "# Shared", Permission::Editable).await;
    let uri = format!("/api/notes/{}", encode_note_id(&note.id));

    let in_flight = app.state.pool.lock_for_http_update(note.id).unwrap();
    let busy = app
        .call(Method::PUT, &uri, Some(&session), Some(json!({ "content": "# Second" })))
        .await;
    assert_eq!(busy.status, StatusCode::FORBIDDEN);
    assert_eq!(busy.json()["status"], "error");
    assert!(busy.json()["message"].as_str().unwrap().contains("no users is online"));
    drop(in_flight);

    let ok = app
        .call(Method::PUT, &uri, Some(&session), Some(json!({ "content": "# Second" })))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
}
