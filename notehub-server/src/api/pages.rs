//! Browser-facing note routes
//!
//! `/:note_id` accepts an alias, a short id or an encoded note id. These
//! routes are merged last; the static API paths win over them.

use axum::{
    extract::{Path, Query, State},
    http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use notehub_common::markdown::{extract_meta, generate_description, parse_meta};
use notehub_common::models::Note;
use notehub_common::note_id::encode_note_id;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{can_edit_note, can_view_note, new_note_permission};
use crate::auth::MaybeUser;
use crate::db::notes::{self, NewNote, NoteFilter, NoteOrder};
use crate::db::revisions;
use crate::error::{ApiError, ApiResult, PageError, PageResult};
use crate::render;
use crate::AppState;

/// Notes listed on a signed-in user's index page
const INDEX_NOTES: i64 = 20;

fn note_path(note: &Note) -> String {
    format!("/{}", encode_note_id(&note.id))
}

async fn load_visible(state: &AppState, user_id: Option<Uuid>, route_id: &str) -> PageResult<Note> {
    let note = notes::find_note(&state.db, route_id)
        .await?
        .ok_or(PageError::NotFound)?;
    if !can_view_note(&state.config, &note, user_id) {
        return Err(PageError::Forbidden);
    }
    Ok(note)
}

async fn create_note_for(state: &AppState, user_id: Option<Uuid>, alias: Option<String>, content: String) -> PageResult<Note> {
    if user_id.is_none() && !state.config.allow_anonymous {
        return Err(PageError::Forbidden);
    }
    let note = notes::create_aliased_note(
        &state.db,
        NewNote {
            owner_id: user_id,
            alias,
            content,
            permission: new_note_permission(&state.config, user_id),
        },
    )
    .await?;
    Ok(note)
}

/// GET /
pub async fn index(State(state): State<AppState>, user: MaybeUser) -> PageResult<Html<String>> {
    let Some(user) = user.0 else {
        return Ok(Html(render::index_page(None, &[])));
    };

    let filter = NoteFilter {
        order_by: Some(NoteOrder::UpdatedAt),
        descending: true,
        ..NoteFilter::default()
    };
    let notes = notes::list_owned_notes(&state.db, user.id, &filter, INDEX_NOTES, 0).await?;
    Ok(Html(render::index_page(Some(&user), &notes)))
}

/// GET /new
pub async fn new_note(State(state): State<AppState>, user: MaybeUser) -> PageResult<Redirect> {
    let note = create_note_for(&state, user.id(), None, String::new()).await?;
    Ok(Redirect::to(&note_path(&note)))
}

/// POST /new with an optional markdown body
pub async fn new_note_with_content(
    State(state): State<AppState>,
    user: MaybeUser,
    body: String,
) -> PageResult<Redirect> {
    let note = create_note_for(&state, user.id(), None, body).await?;
    Ok(Redirect::to(&note_path(&note)))
}

/// GET /:note_id
pub async fn show_note(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(route_id): Path<String>,
) -> PageResult<Html<String>> {
    let user_id = user.id();
    let note = match notes::find_note(&state.db, &route_id).await? {
        Some(note) => note,
        None => {
            let config = &state.config;
            if !config.allow_free_url || config.forbidden_note_ids.iter().any(|id| *id == route_id) {
                return Err(PageError::NotFound);
            }
            // Free URL: the path becomes the alias of a new note
            let note = create_note_for(&state, user_id, Some(route_id.clone()), String::new()).await?;
            info!(note_id = %note.id, alias = %route_id, "Created note from free URL");
            note
        }
    };

    if !can_view_note(&state.config, &note, user_id) {
        return Err(PageError::Forbidden);
    }
    notes::increment_viewcount(&state.db, note.id).await?;

    let editable = can_edit_note(&state.config, &note, user_id);
    Ok(Html(render::editor_page(&note, editable)))
}

/// Published views, reached through their canonical id
async fn published(state: &AppState, user: &MaybeUser, route_id: &str, prefix: &str) -> PageResult<Result<Note, Redirect>> {
    let mut note = load_visible(state, user.id(), route_id).await?;
    if route_id != note.public_id() {
        return Ok(Err(Redirect::to(&format!("/{}/{}", prefix, note.public_id()))));
    }
    notes::increment_viewcount(&state.db, note.id).await?;
    note.viewcount += 1;
    Ok(Ok(note))
}

/// GET /s/:shortid
pub async fn show_published(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(route_id): Path<String>,
) -> PageResult<Response> {
    Ok(match published(&state, &user, &route_id, "s").await? {
        Ok(note) => (
            [(CACHE_CONTROL, "private")],
            Html(render::publish_page(&note)),
        )
            .into_response(),
        Err(redirect) => redirect.into_response(),
    })
}

/// GET /p/:shortid
pub async fn show_slide(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(route_id): Path<String>,
) -> PageResult<Response> {
    Ok(match published(&state, &user, &route_id, "p").await? {
        Ok(note) => Html(render::slide_page(&note)).into_response(),
        Err(redirect) => redirect.into_response(),
    })
}

/// GET /s/:shortid/:action and /p/:shortid/:action
pub async fn published_action(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((route_id, action)): Path<(String, String)>,
) -> PageResult<Redirect> {
    let note = load_visible(&state, user.id(), &route_id).await?;
    match action.as_str() {
        "edit" => Ok(Redirect::to(&note_path(&note))),
        _ => Ok(Redirect::to(&format!("/s/{}", note.public_id()))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionQuery {
    pub export_type: Option<String>,
}

/// GET /:note_id/:action
pub async fn note_action(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((route_id, action)): Path<(String, String)>,
    Query(query): Query<ActionQuery>,
) -> Response {
    run_action(&state, &user, &route_id, &action, None, &query).await
}

/// GET /:note_id/:action/:action_id
pub async fn note_action_with_id(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((route_id, action, action_id)): Path<(String, String, String)>,
    Query(query): Query<ActionQuery>,
) -> Response {
    run_action(&state, &user, &route_id, &action, Some(&action_id), &query).await
}

async fn run_action(
    state: &AppState,
    user: &MaybeUser,
    route_id: &str,
    action: &str,
    action_id: Option<&str>,
    query: &ActionQuery,
) -> Response {
    match action {
        "info" => note_info(state, user, route_id).await.into_response(),
        "revision" => note_revision(state, user, route_id, action_id).await.into_response(),
        _ => page_action(state, user, route_id, action, query).await.into_response(),
    }
}

async fn page_action(
    state: &AppState,
    user: &MaybeUser,
    route_id: &str,
    action: &str,
    query: &ActionQuery,
) -> PageResult<Response> {
    let note = load_visible(state, user.id(), route_id).await?;

    let response = match action {
        "publish" | "pretty" => Redirect::to(&format!("/s/{}", note.public_id())).into_response(),
        "slide" => Redirect::to(&format!("/p/{}", note.public_id())).into_response(),
        "download" => attachment(&note.title, "md", "text/markdown; charset=UTF-8", note.content.clone()),
        "pdf" => {
            if !state.config.allow_pdf_export {
                return Err(PageError::Forbidden);
            }
            Html(render::print_page(&note)).into_response()
        }
        "pandoc" => match query.export_type.as_deref() {
            Some("html") => attachment(&note.title, "html", "text/html; charset=UTF-8", render::export_document(&note)),
            other => {
                return Err(PageError::BadRequest(format!(
                    "unsupported export type: {}",
                    other.unwrap_or("none")
                )))
            }
        },
        // Gist export is not offered; send the visitor back to the note
        _ => Redirect::to(&note_path(&note)).into_response(),
    };
    Ok(response)
}

fn attachment(title: &str, ext: &str, content_type: &'static str, body: String) -> Response {
    let file_name = format!("{}.{}", title.trim(), ext);
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&file_name)
    );
    ([(CONTENT_TYPE, content_type.to_string()), (CONTENT_DISPOSITION, disposition)], body).into_response()
}

async fn note_info(state: &AppState, user: &MaybeUser, route_id: &str) -> ApiResult<Json<serde_json::Value>> {
    let note = notes::find_note(&state.db, route_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    if !can_view_note(&state.config, &note, user.id()) {
        return Err(ApiError::forbidden());
    }

    let (meta, body) = extract_meta(&note.content);
    let description = parse_meta(meta)
        .description
        .unwrap_or_else(|| generate_description(body));

    Ok(Json(json!({
        "title": note.title,
        "description": description,
        "viewcount": note.viewcount,
        "createtime": note.created_at,
        "updatetime": note.last_change_at.unwrap_or(note.updated_at),
    })))
}

async fn note_revision(
    state: &AppState,
    user: &MaybeUser,
    route_id: &str,
    action_id: Option<&str>,
) -> ApiResult<Json<serde_json::Value>> {
    let note = notes::find_note(&state.db, route_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    if !can_view_note(&state.config, &note, user.id()) {
        return Err(ApiError::forbidden());
    }

    let Some(action_id) = action_id else {
        let list = revisions::list_revisions(&state.db, note.id).await?;
        return Ok(Json(json!({ "revision": list })));
    };

    let time: i64 = action_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid revision time: {}", action_id)))?;
    let revision = revisions::revision_at(&state.db, note.id, time)
        .await?
        .ok_or_else(ApiError::not_found)?;

    let created: DateTime<Utc> = revision.created_at;
    Ok(Json(json!({
        "content": revision.content,
        "authorship": revision.authorship,
        "time": created.timestamp_millis(),
        "length": revision.length,
    })))
}

/// Build page routes
pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/new", get(new_note).post(new_note_with_content))
        .route("/s/:note_id", get(show_published))
        .route("/s/:note_id/:action", get(published_action))
        .route("/p/:note_id", get(show_slide))
        .route("/p/:note_id/:action", get(published_action))
        .route("/:note_id", get(show_note))
        .route("/:note_id/:action", get(note_action))
        .route("/:note_id/:action/:action_id", get(note_action_with_id))
}
